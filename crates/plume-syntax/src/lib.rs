//! Lexical layer of the Plume language service.
//!
//! Two error-tolerant, position-tracking lexers (DocQL and GraphQL), the
//! statement splitter that turns a document into hashed statements, the
//! diagnostic taxonomy shared by every validator, and the rendering
//! descriptor stream consumed by the host's canvas painter.
//!
//! Both lexers are total: every character of the input is covered by exactly
//! one token, lexical errors are reported in-band as illegal tokens, and the
//! token stream is terminated by a synthetic end-of-input token.
//!
//! ## Example
//! ```rust
//! use plume_syntax::{docql, statement};
//!
//! let source = "USE shop;\nSELECT * FROM \"orders\";";
//! let tokens = docql::lex(source);
//! let statements = statement::split_docql(source, &tokens);
//!
//! assert_eq!(statements.len(), 2);
//! assert_eq!(statements[1].text, "SELECT * FROM \"orders\";");
//! ```

mod cursor;
mod diagnostic;
mod render;
pub mod statement;
mod token;

pub mod docql;
pub mod graphql;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, ValidationResult};
pub use render::{render_lines, RenderCategory, RenderKind, RenderLine, RenderSpan};
pub use statement::{split_docql, split_graphql, statement_hash, Statement};
pub use token::{Literal, Token};
