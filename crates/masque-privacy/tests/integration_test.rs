//! End-to-end anonymization with an in-process NER model.

use async_trait::async_trait;
use masque_core::{AnonymizerConfig, EntityType};
use masque_db::AllowlistStore;
use masque_detect::{DetectError, ModelLoader, ModelRegistry, NerModel, RawEntity};
use masque_privacy::{deanonymize, Anonymizer, Document, PrivacyHooks, SessionState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Tags fixed words with fixed labels.
struct GazetteerModel;

const GAZETTEER: &[(&str, &str, f64)] = &[
    ("Jane Doe", "PERSON", 0.95),
    ("Initech", "ORG", 0.80),
    ("Bologna", "GPE", 0.90),
    ("Maybe Person", "PERSON", 0.20),
];

#[async_trait]
impl NerModel for GazetteerModel {
    async fn entities(&self, text: &str) -> masque_detect::Result<Vec<RawEntity>> {
        Ok(GAZETTEER
            .iter()
            .flat_map(|(word, label, score)| {
                text.match_indices(word).map(move |(start, _)| RawEntity {
                    start,
                    end: start + word.len(),
                    label: (*label).to_string(),
                    score: Some(*score),
                })
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "en_core_web_sm"
    }
}

struct Loader {
    installed: bool,
}

#[async_trait]
impl ModelLoader for Loader {
    async fn load(&self, _name: &str) -> masque_detect::Result<Option<Arc<dyn NerModel>>> {
        Ok(self
            .installed
            .then(|| Arc::new(GazetteerModel) as Arc<dyn NerModel>))
    }

    async fn download(&self, name: &str) -> masque_detect::Result<()> {
        Err(DetectError::ModelLoad {
            model: name.to_string(),
            message: "no network".to_string(),
        })
    }
}

async fn anonymizer(dir: &TempDir, installed: bool) -> Anonymizer {
    let config = AnonymizerConfig {
        sqlite_db_path: dir.path().join("allowedlist.db"),
        ..Default::default()
    };
    let registry = Arc::new(ModelRegistry::new(
        Arc::new(Loader { installed }),
        Duration::from_secs(5),
    ));
    let allowlist = Arc::new(
        AllowlistStore::try_open(config.sqlite_db_path.clone())
            .await
            .expect("open allowlist"),
    );
    Anonymizer::new(config, registry, allowlist)
}

#[tokio::test]
async fn test_contact_line_end_to_end() {
    let dir = TempDir::new().expect("create temp dir");
    let anonymizer = anonymizer(&dir, true).await;
    let text = "Contact me at jane@example.com or +1 415 555 0132";

    let spans = anonymizer.detect(text).await;
    let found: Vec<(&str, EntityType)> = spans
        .iter()
        .map(|s| (s.text.as_str(), s.entity_type))
        .collect();
    assert_eq!(
        found,
        vec![
            ("jane@example.com", EntityType::Email),
            ("+1 415 555 0132", EntityType::Phone),
        ]
    );

    let (anonymized, mapping) = anonymizer.substitute(text, &spans);
    assert_eq!(mapping.len(), 2);
    let tokens: Vec<&str> = mapping.placeholders().collect();
    assert_ne!(tokens[0], tokens[1]);
    for (token, original) in &mapping {
        assert!(anonymized.contains(token));
        assert!(text.contains(original));
    }
    assert!(anonymized.starts_with("Contact me at [EMAIL_"));

    assert_eq!(deanonymize(&anonymized, &mapping), text);
}

#[tokio::test]
async fn test_allowlisted_entity_kept() {
    let dir = TempDir::new().expect("create temp dir");
    let anonymizer = anonymizer(&dir, true).await;
    anonymizer
        .allowlist()
        .add_entity("jane@example.com", EntityType::Email, "staff.pdf")
        .await
        .expect("add entity");

    let text = "Write to jane@example.com";
    let (anonymized, mapping) = anonymizer.anonymize(text).await;

    assert_eq!(anonymized, text);
    assert!(mapping.is_empty());
}

#[tokio::test]
async fn test_names_from_model_and_threshold() {
    let dir = TempDir::new().expect("create temp dir");
    let anonymizer = anonymizer(&dir, true).await;
    let text = "Jane Doe of Initech, Bologna. Maybe Person too.";

    let (anonymized, mapping) = anonymizer.anonymize(text).await;

    let originals: Vec<&str> = mapping.iter().map(|(_, o)| o).collect();
    assert_eq!(originals, vec!["Jane Doe", "Initech", "Bologna"]);
    assert!(anonymized.contains("Maybe Person"));
    assert!(anonymized.starts_with("[PERSON_"));
    assert_eq!(deanonymize(&anonymized, &mapping), text);
}

#[tokio::test]
async fn test_missing_model_degrades_to_patterns() {
    let dir = TempDir::new().expect("create temp dir");
    let anonymizer = anonymizer(&dir, false).await;

    let (anonymized, mapping) = anonymizer
        .anonymize("Jane Doe, jane@example.com")
        .await;

    assert_eq!(mapping.len(), 1);
    assert!(anonymized.starts_with("Jane Doe, [EMAIL_"));
}

#[tokio::test]
async fn test_total_backend_failure_returns_input() {
    let dir = TempDir::new().expect("create temp dir");
    let anonymizer = anonymizer(&dir, false).await;
    anonymizer.allowlist().close().await;

    let text = "nothing sensitive here";
    let (anonymized, mapping) = anonymizer.anonymize(text).await;
    assert_eq!(anonymized, text);
    assert!(mapping.is_empty());
}

#[tokio::test]
async fn test_document_retraction_restores_anonymization() {
    let dir = TempDir::new().expect("create temp dir");
    let hooks = PrivacyHooks::new(anonymizer(&dir, true).await);
    let mut session = SessionState::new();

    hooks
        .on_document_ingest(Document::new(
            "Jane Doe runs Initech",
            "https://intranet.local/org",
        ))
        .await;
    let sent = hooks
        .on_user_message(&mut session, "Ask Jane Doe about Initech")
        .await;
    assert_eq!(sent, "Ask Jane Doe about Initech");

    assert_eq!(hooks.on_source_removed("https://intranet.local/org").await, 2);
    let sent = hooks
        .on_user_message(&mut session, "Ask Jane Doe about Initech")
        .await;
    assert!(!sent.contains("Jane Doe"));
    assert!(!sent.contains("Initech"));

    let reply = hooks.on_response(&session, &sent);
    assert_eq!(reply.display_text(), "Ask Jane Doe about Initech");
}

#[tokio::test]
async fn test_reset_from_settings_persists_cleared_flag() {
    let dir = TempDir::new().expect("create temp dir");
    let hooks = PrivacyHooks::new(anonymizer(&dir, true).await);
    hooks
        .on_document_ingest(Document::new("Initech", "doc"))
        .await;

    let config_path: PathBuf = dir.path().join("config.toml");
    let config = AnonymizerConfig {
        reset_db: true,
        ..hooks.anonymizer().config().clone()
    };
    config.save_to(&config_path).expect("save config");

    let applied = hooks.apply_settings(config).await.expect("apply settings");
    assert!(!applied.reset_db);
    AnonymizerConfig::clear_reset_flag(&config_path).expect("clear flag");

    let reloaded = AnonymizerConfig::load_from(&config_path).expect("reload config");
    assert!(!reloaded.reset_db);
    assert!(!hooks.anonymizer().allowlist().is_allowed("Initech"));
}
