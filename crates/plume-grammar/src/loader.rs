use crate::symbol::{Matcher, Production, Symbol};
use indexmap::IndexMap;
use plume_syntax::docql::{Keyword, TokenKind};
use plume_syntax::Token;
use serde::Deserialize;
use thiserror::Error;

/// Statement families, each backed by its own grammar file and chosen by the
/// first significant token of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementFamily {
    Ddl,
    Dml,
    Dol,
    Migration,
}

impl StatementFamily {
    pub const ALL: [StatementFamily; 4] = [
        StatementFamily::Ddl,
        StatementFamily::Dml,
        StatementFamily::Dol,
        StatementFamily::Migration,
    ];

    /// Maps a statement's first significant token to its family.
    pub fn dispatch(first: &Token<TokenKind>) -> Option<StatementFamily> {
        let TokenKind::Keyword(keyword) = first.kind() else {
            return None;
        };
        let family = match keyword {
            Keyword::Create | Keyword::Alter | Keyword::Drop => StatementFamily::Ddl,
            Keyword::Select | Keyword::Insert | Keyword::Update | Keyword::Delete => {
                StatementFamily::Dml
            }
            Keyword::Grant | Keyword::Revoke | Keyword::Use | Keyword::Show => StatementFamily::Dol,
            Keyword::Migration | Keyword::Apply | Keyword::Validate | Keyword::Rollback => {
                StatementFamily::Migration
            }
            _ => return None,
        };
        Some(family)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementFamily::Ddl => "ddl",
            StatementFamily::Dml => "dml",
            StatementFamily::Dol => "dol",
            StatementFamily::Migration => "migration",
        }
    }
}

/// A loaded grammar: a semantic version and a map from rule name to its
/// alternative productions. Immutable after load.
#[derive(Debug, Clone, Deserialize)]
pub struct Grammar {
    pub version: String,
    pub rules: IndexMap<String, Vec<Production>>,
}

pub(crate) const ROOT_RULE: &str = "root";

impl Grammar {
    /// The rule's alternative productions, if the rule exists.
    pub fn rule(&self, name: &str) -> Option<&[Production]> {
        self.rules.get(name).map(Vec::as_slice)
    }

    /// Alternative productions of the grammar's entry rule.
    pub fn root(&self) -> &[Production] {
        self.rules
            .get(ROOT_RULE)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum GrammarLoadError {
    #[error("grammar for {family} is not valid JSON: {source}")]
    Parse {
        family: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("grammar for {family} has no `root` rule")]
    MissingRoot { family: &'static str },
    #[error("grammar for {family} references unknown rule `{rule}`")]
    UnknownRule { family: &'static str, rule: String },
}

/// One grammar per statement family.
#[derive(Debug, Clone)]
pub struct GrammarSet {
    ddl: Grammar,
    dml: Grammar,
    dol: Grammar,
    migration: Grammar,
}

impl GrammarSet {
    /// Parses the grammars embedded in the crate.
    pub fn embedded() -> Result<GrammarSet, GrammarLoadError> {
        GrammarSet::from_sources(
            include_str!("../grammars/ddl.json"),
            include_str!("../grammars/dml.json"),
            include_str!("../grammars/dol.json"),
            include_str!("../grammars/migration.json"),
        )
    }

    /// Parses four grammar JSON documents, one per family, and checks that
    /// every `reference` symbol resolves.
    pub fn from_sources(
        ddl: &str,
        dml: &str,
        dol: &str,
        migration: &str,
    ) -> Result<GrammarSet, GrammarLoadError> {
        let set = GrammarSet {
            ddl: parse_grammar("ddl", ddl)?,
            dml: parse_grammar("dml", dml)?,
            dol: parse_grammar("dol", dol)?,
            migration: parse_grammar("migration", migration)?,
        };
        for family in StatementFamily::ALL {
            validate_grammar(family.as_str(), set.grammar(family))?;
        }
        Ok(set)
    }

    pub fn grammar(&self, family: StatementFamily) -> &Grammar {
        match family {
            StatementFamily::Ddl => &self.ddl,
            StatementFamily::Dml => &self.dml,
            StatementFamily::Dol => &self.dol,
            StatementFamily::Migration => &self.migration,
        }
    }
}

fn parse_grammar(family: &'static str, source: &str) -> Result<Grammar, GrammarLoadError> {
    serde_json::from_str(source).map_err(|source| GrammarLoadError::Parse { family, source })
}

fn validate_grammar(family: &'static str, grammar: &Grammar) -> Result<(), GrammarLoadError> {
    if !grammar.rules.contains_key(ROOT_RULE) {
        return Err(GrammarLoadError::MissingRoot { family });
    }
    for productions in grammar.rules.values() {
        for production in productions {
            validate_symbols(family, grammar, production)?;
        }
    }
    Ok(())
}

fn validate_symbols(
    family: &'static str,
    grammar: &Grammar,
    symbols: &[Symbol],
) -> Result<(), GrammarLoadError> {
    for symbol in symbols {
        match &symbol.matcher {
            Matcher::Reference { rule } => {
                if !grammar.rules.contains_key(rule) {
                    return Err(GrammarLoadError::UnknownRule {
                        family,
                        rule: rule.clone(),
                    });
                }
            }
            Matcher::Branches { alternatives } => {
                for alternative in alternatives {
                    validate_symbols(family, grammar, alternative)?;
                }
            }
            Matcher::Token { .. } | Matcher::Literal { .. } => {}
        }
    }
    Ok(())
}
