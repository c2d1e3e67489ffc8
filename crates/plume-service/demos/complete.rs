//! Prints the completion list at the end of a DocQL fragment, against a
//! small in-memory schema.
//!
//! ```sh
//! cargo run --example complete -- 'SELECT * FROM '
//! ```

use plume_service::{
    DatabaseDefinition, DocqlLanguageService, LanguageService, ServiceConfig,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let text = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "SELECT * FROM ".to_string());

    let service = DocqlLanguageService::new("demo.docql", ServiceConfig::default());
    if let Err(error) = service.initialize().await {
        eprintln!("initialization failed: {error}");
        return;
    }

    let databases: Vec<DatabaseDefinition> = serde_json::from_str(
        r#"[{
            "name": "shop",
            "bundles": [
                {
                    "name": "orders",
                    "fields": [
                        { "name": "total", "type": "number" },
                        { "name": "shipped", "type": "boolean" }
                    ]
                },
                { "name": "users", "fields": [{ "name": "email", "type": "text" }] }
            ]
        }]"#,
    )
    .expect("demo schema is valid");
    service.update_context_data(databases);
    service.set_database_context(Some("shop".to_string()));

    let suggestions = service.get_suggestions(&text, text.len(), None).await;
    println!("{} suggestions after {text:?}:", suggestions.len());
    for suggestion in suggestions {
        println!(
            "  {:<24} {:?}  (priority {}{})",
            suggestion.label,
            suggestion.kind,
            suggestion.priority,
            suggestion
                .detail
                .map(|d| format!(", {d}"))
                .unwrap_or_default(),
        );
    }

    service.dispose();
}
