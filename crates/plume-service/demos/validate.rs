//! Validates a DocQL document from the command line and prints every
//! diagnostic with its source span.
//!
//! ```sh
//! cargo run --example validate -- 'USE shop; SELECT * FROM "orders" LIMIT 10;'
//! ```

use plume_service::{DocqlLanguageService, LanguageService, ServiceConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let source = std::env::args().nth(1).unwrap_or_else(|| {
        "USE shop;\nSELECT * FROM \"orders\" WHERE total >= 10 LIMIT 5;".to_string()
    });

    let service = DocqlLanguageService::new("demo.docql", ServiceConfig::default());
    if let Err(error) = service.initialize().await {
        eprintln!("initialization failed: {error}");
        return;
    }

    let result = service.validate(&source, None).await;
    println!(
        "{} ({} errors, {} warnings)",
        if result.valid { "valid" } else { "invalid" },
        result.errors.len(),
        result.warnings.len(),
    );
    for diagnostic in result.all() {
        let snippet = &source[diagnostic.start_offset..diagnostic.end_offset.min(source.len())];
        println!(
            "  [{:?}] {} at {}..{} {:?}",
            diagnostic.code.as_str(),
            diagnostic.message,
            diagnostic.start_offset,
            diagnostic.end_offset,
            snippet,
        );
    }

    service.dispose();
}
