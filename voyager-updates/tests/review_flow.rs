//! Review workflow integration tests: ingest, approve, reject, auto-apply

use std::fs;
use std::sync::Arc;

use git2::Repository;
use tempfile::TempDir;
use voyager_updates::{
    AutoApplyPolicy, GitConfigStore, JsonSessionRepository, MemoryAuditSink, ProposalStatus,
    ReviewService, SessionSource, UpdateApplier,
};

const CONFIG: &str = r#"{
  "domainExpertise": {
    "mission": "Help users.",
    "interviewPrep": "Practice STAR answers."
  },
  "modes": {
    "coach": ["Be kind."]
  }
}
"#;

fn extractor_output() -> String {
    let check = r#"{
        "elevation": {"passes": true, "reasoning": "Raises quality"},
        "transparency": {"passes": true, "reasoning": "Honest"},
        "agency": {"passes": true, "reasoning": "User decides"},
        "growth": {"passes": true, "reasoning": "Builds skill"}
    }"#;
    let proposal = |section: &str, addition: &str, confidence: u8, auto: bool| {
        format!(
            r#"{{"section": "{section}", "suggestedAddition": "{addition}", "reasoning": "r",
                "priority": "high", "constitutionalCheck": {check}, "confidence": {confidence},
                "evidenceFromSession": "e", "riskLevel": "low", "riskReasoning": "",
                "autoApplyRecommendation": {auto}}}"#
        )
    };

    format!(
        "I analyzed the conversation.\n\n```json\n{{\"topic\": \"Interview anxiety\", \"insights\": [], \"promptUpdates\": [{}, {}, {}, {}]}}\n```",
        proposal("domainExpertise.mission", "Always ask clarifying questions.", 95, true),
        proposal("domainExpertise.interviewPrep", "Offer a mock interview.", 85, true),
        proposal("modes.coach", "Normalize nerves.", 92, true),
        proposal("domainExpertise.salary", "Discuss ranges.", 99, true),
    )
}

struct Fixture {
    tempdir: TempDir,
    service: ReviewService,
}

impl Fixture {
    async fn new() -> Self {
        let tempdir = TempDir::new().unwrap();
        let repo = Repository::init(tempdir.path()).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Reviewer").unwrap();
            config.set_str("user.email", "reviewer@example.com").unwrap();
        }

        let config_dir = tempdir.path().join("communities");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("careersy.json"), CONFIG).unwrap();

        let store = Arc::new(GitConfigStore::open(&config_dir).unwrap());
        let applier = UpdateApplier::new(store, Arc::new(MemoryAuditSink::new()));
        let sessions = JsonSessionRepository::open(tempdir.path().join("sessions"))
            .await
            .unwrap();
        let service = ReviewService::new(applier, Arc::new(sessions))
            .with_policy(AutoApplyPolicy::new(90));

        Self { tempdir, service }
    }

    fn document(&self) -> serde_json::Value {
        let path = self.tempdir.path().join("communities/careersy.json");
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    fn source() -> SessionSource {
        SessionSource {
            conversation_id: "conv-42".to_string(),
            expert_id: "expert-7".to_string(),
            community_id: "careersy".to_string(),
        }
    }
}

#[tokio::test]
async fn test_ingest_creates_pending_session() {
    let f = Fixture::new().await;
    let session = f
        .service
        .ingest(Fixture::source(), &extractor_output())
        .await
        .unwrap();

    assert_eq!(session.topic, "Interview anxiety");
    assert_eq!(session.proposals().len(), 4);
    assert!(!session.is_processed());

    let pending = f.service.pending().await.unwrap();
    assert_eq!(pending.len(), 4);
    let eligible: Vec<usize> = pending
        .iter()
        .filter(|p| p.auto_apply_eligible)
        .map(|p| p.index)
        .collect();
    assert_eq!(eligible, vec![0, 2, 3]);
}

#[tokio::test]
async fn test_auto_apply_then_manual_review() {
    let f = Fixture::new().await;
    let session = f
        .service
        .ingest(Fixture::source(), &extractor_output())
        .await
        .unwrap();

    let summary = f.service.auto_apply(&session.id).await.unwrap();
    assert_eq!(summary.eligible, 3);
    assert_eq!(summary.applied, 2);
    assert!(!summary.success);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].starts_with("proposal 3: "));
    assert!(summary.errors[0].contains("salary"));

    let doc = f.document();
    assert_eq!(
        doc["domainExpertise"]["mission"],
        "Help users.\n\nAlways ask clarifying questions."
    );
    assert_eq!(doc["modes"]["coach"][1], "Normalize nerves.");
    assert_eq!(doc["domainExpertise"]["interviewPrep"], "Practice STAR answers.");

    // Below the auto-apply bar, but a reviewer may still approve it
    let result = f.service.approve(&session.id, 1).await.unwrap();
    assert!(result.success);
    f.service.reject(&session.id, 3).await.unwrap();

    let session = f.service.session(&session.id).await.unwrap();
    assert!(session.is_processed());
    assert_eq!(session.status(1).unwrap(), ProposalStatus::Applied);
    assert_eq!(session.status(3).unwrap(), ProposalStatus::Rejected);
    assert!(f.service.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_approvals_serialize_per_community() {
    let f = Fixture::new().await;
    let session = f
        .service
        .ingest(Fixture::source(), &extractor_output())
        .await
        .unwrap();

    let (a, b, c) = tokio::join!(
        f.service.approve(&session.id, 0),
        f.service.approve(&session.id, 1),
        f.service.approve(&session.id, 2),
    );
    assert!(a.unwrap().success);
    assert!(b.unwrap().success);
    assert!(c.unwrap().success);

    let session = f.service.session(&session.id).await.unwrap();
    assert_eq!(session.applied().len(), 3);

    let doc = f.document();
    assert!(doc["domainExpertise"]["mission"]
        .as_str()
        .unwrap()
        .ends_with("Always ask clarifying questions."));
    assert!(doc["domainExpertise"]["interviewPrep"]
        .as_str()
        .unwrap()
        .ends_with("Offer a mock interview."));
    assert_eq!(doc["modes"]["coach"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_sessions_survive_reopen() {
    let f = Fixture::new().await;
    let session = f
        .service
        .ingest(Fixture::source(), &extractor_output())
        .await
        .unwrap();
    f.service.reject(&session.id, 0).await.unwrap();

    let reopened = JsonSessionRepository::open(f.tempdir.path().join("sessions"))
        .await
        .unwrap();
    let loaded = voyager_updates::SessionRepository::get(&reopened, &session.id)
        .await
        .unwrap();
    assert_eq!(loaded.status(0).unwrap(), ProposalStatus::Rejected);
    assert_eq!(loaded.expert_id, "expert-7");
}
