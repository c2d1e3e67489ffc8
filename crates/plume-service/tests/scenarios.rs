//! End-to-end scenarios exercised through the public service facade.

use plume_context::RootOperation;
use plume_service::{
    DatabaseDefinition, DiagnosticCode, DocqlLanguageService, GraphqlLanguageService,
    LanguageService, ServiceConfig, SuggestionKind,
};
use pretty_assertions::assert_eq;

fn docql_service() -> DocqlLanguageService {
    DocqlLanguageService::new("test.docql", ServiceConfig::default())
}

fn graphql_service() -> GraphqlLanguageService {
    GraphqlLanguageService::new("test.graphql", ServiceConfig::default())
}

fn test_databases() -> Vec<DatabaseDefinition> {
    serde_json::from_value(serde_json::json!([
        {
            "name": "testdb",
            "bundles": [
                {
                    "name": "users",
                    "fields": [
                        { "name": "email", "type": "text", "constraints": {} },
                        { "name": "age", "type": "number", "constraints": {} }
                    ]
                }
            ]
        }
    ]))
    .expect("test fixture is valid")
}

#[tokio::test(flavor = "current_thread")]
async fn missing_identifier_fails_at_the_semicolon() {
    let service = docql_service();
    service.initialize().await.unwrap();

    let source = "CREATE DATABASE;";
    let result = service.validate(source, None).await;

    assert!(!result.valid);
    let error = &result.errors[0];
    assert!(matches!(
        error.code,
        DiagnosticCode::UnexpectedToken | DiagnosticCode::UnexpectedEof
    ));
    assert_eq!(error.start_offset, source.len() - 1);
}

#[tokio::test(flavor = "current_thread")]
async fn select_with_limit_is_valid() {
    let service = docql_service();
    service.initialize().await.unwrap();

    let result = service
        .validate("SELECT * from \"orders\" LIMIT 10;", None)
        .await;

    assert_eq!(result.errors, vec![]);
    assert!(result.valid);
}

#[tokio::test(flavor = "current_thread")]
async fn unknown_bundle_is_reported_over_its_name() {
    let service = docql_service();
    service.initialize().await.unwrap();
    service.update_context_data(test_databases());
    service.set_database_context(Some("testdb".to_string()));

    let source = "SELECT * FROM nonexistent;";
    let result = service.validate(source, None).await;

    let finding = result
        .all()
        .find(|d| d.code == DiagnosticCode::BundleNotFound)
        .expect("expected BUNDLE_NOT_FOUND");
    assert_eq!(&source[finding.start_offset..finding.end_offset], "nonexistent");
}

#[tokio::test(flavor = "current_thread")]
async fn graphql_empty_selection_set() {
    let service = graphql_service();
    service.initialize().await.unwrap();

    let result = service.validate("query { }", None).await;

    assert!(!result.valid);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, DiagnosticCode::EmptySelectionSet);
}

#[tokio::test(flavor = "current_thread")]
async fn graphql_unknown_root_field_warns() {
    let service = graphql_service();
    service.initialize().await.unwrap();
    service
        .context()
        .write()
        .set_root_fields(RootOperation::Query, vec!["users".to_string()]);

    let source = "{ posts { id } }";
    let result = service.validate(source, None).await;

    assert!(result.valid);
    let warning = result
        .warnings
        .iter()
        .find(|d| d.code == DiagnosticCode::UnknownField)
        .expect("expected UNKNOWN_FIELD");
    assert_eq!(&source[warning.start_offset..warning.end_offset], "posts");
}

#[tokio::test(flavor = "current_thread")]
async fn suggestions_are_suppressed_at_a_literal_position() {
    let service = docql_service();
    service.initialize().await.unwrap();
    service.update_context_data(test_databases());
    service.set_database_context(Some("testdb".to_string()));

    let text = "SELECT * FROM \"users\" WHERE \"email\" == ";
    let suggestions = service.get_suggestions(text, text.len(), None).await;

    assert_eq!(suggestions, vec![]);
}

#[tokio::test(flavor = "current_thread")]
async fn bundles_are_suggested_after_from() {
    let service = docql_service();
    service.initialize().await.unwrap();
    service.update_context_data(test_databases());
    service.set_database_context(Some("testdb".to_string()));

    let text = "SELECT * FROM ";
    let suggestions = service.get_suggestions(text, text.len(), None).await;

    let bundle = suggestions
        .iter()
        .find(|s| s.kind == SuggestionKind::Bundle && s.label == "users")
        .expect("expected the users bundle");
    for keyword in suggestions
        .iter()
        .filter(|s| s.kind == SuggestionKind::Keyword)
    {
        assert!(bundle.priority > keyword.priority);
    }
}

#[tokio::test(flavor = "current_thread")]
async fn repeated_updates_leave_the_cache_clean_after_one_pass() {
    let service = docql_service();
    service.initialize().await.unwrap();

    let source = "USE testdb; SELECT * FROM \"users\";";
    service.update_document(source);
    service.force_validation().await;
    assert_eq!(service.dirty_statement_count(), 0);

    // An identical update re-parses to identical hashes; nothing goes dirty.
    service.update_document(source);
    assert_eq!(service.dirty_statement_count(), 0);
    let second_pass = service.force_validation().await;
    assert!(second_pass.valid);
    assert_eq!(second_pass.all().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn debounce_validates_after_quiescence() {
    let service = docql_service();
    service.initialize().await.unwrap();

    service.update_document("USE a;");
    service.update_document("USE ab;");
    assert!(service.dirty_statement_count() > 0);

    // Only the second edit's timer survives; once it fires the dirty set
    // drains in one coalesced pass.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    tokio::task::yield_now().await;
    assert_eq!(service.dirty_statement_count(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn editing_a_statement_marks_only_it_dirty() {
    let service = docql_service();
    service.initialize().await.unwrap();

    service.update_document("USE testdb; SELECT * FROM \"users\";");
    service.force_validation().await;

    service.update_document("USE testdb; SELECT * FROM \"orders\";");
    // The USE statement kept its hash and stays clean.
    assert_eq!(service.dirty_statement_count(), 2);
    let parsed = service.parse_statements("USE testdb; SELECT * FROM \"orders\";", None);
    assert_eq!(parsed.len(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn disposed_service_goes_quiet() {
    let service = docql_service();
    service.initialize().await.unwrap();
    service.dispose();

    let result = service.validate("USE testdb;", None).await;
    assert!(result.valid);
    assert_eq!(result.all().count(), 0);
    let suggestions = service.get_suggestions("", 0, None).await;
    assert_eq!(suggestions, vec![]);
}

#[tokio::test(flavor = "current_thread")]
async fn rendered_lines_cover_the_document() {
    let service = docql_service();
    service.initialize().await.unwrap();
    service.update_document("USE testdb;\nSELECT * FROM \"users\";");

    let lines = service.rendered_lines();
    assert_eq!(lines.len(), 2);
    let rejoined: String = lines
        .iter()
        .flatten()
        .map(|span| span.text.as_str())
        .collect();
    assert_eq!(rejoined, service.document_text());
}

#[tokio::test(flavor = "current_thread")]
async fn filter_narrows_suggestions() {
    let service = docql_service();
    service.initialize().await.unwrap();

    let suggestions = service.get_suggestions("", 0, Some("sel")).await;
    let labels: Vec<&str> = suggestions.iter().map(|s| s.label.as_str()).collect();
    assert!(labels.contains(&"SELECT"), "got {labels:?}");
    assert!(!labels.contains(&"CREATE DATABASE"));
    assert!(!labels.contains(&"USE"));
}
