use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::models::GeoPoint;
use doctor_cell::services::DoctorService;

use crate::models::{AssistantError, ConversationSession, ConversationTurn, RecommendationRequest};
use crate::services::recommendation::RecommendationClient;

struct SessionEntry {
    owner_id: String,
    // held for the whole send so calls on one session never interleave
    session: Mutex<ConversationSession>,
}

/// Conversational matching over open sessions.
///
/// Sessions are independent; the registry lock is only held long enough to
/// find or change an entry, never across a call to the recommender.
pub struct AssistantService {
    sessions: RwLock<HashMap<Uuid, Arc<SessionEntry>>>,
    doctors: DoctorService,
    client: Arc<dyn RecommendationClient>,
}

impl AssistantService {
    pub fn new(doctors: DoctorService, client: Arc<dyn RecommendationClient>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            doctors,
            client,
        }
    }

    pub async fn create_session(&self, owner_id: &str) -> Uuid {
        let session = ConversationSession::new(owner_id);
        let id = session.id;

        let entry = Arc::new(SessionEntry {
            owner_id: owner_id.to_string(),
            session: Mutex::new(session),
        });
        self.sessions.write().await.insert(id, entry);

        info!("Opened conversation session {} for {}", id, owner_id);
        id
    }

    pub async fn get_history(&self, session_id: Uuid, owner_id: &str) -> Result<Vec<ConversationTurn>, AssistantError> {
        let entry = self.entry(session_id, owner_id).await?;
        let session = entry.session.lock().await;
        Ok(session.turns().to_vec())
    }

    /// Append the patient's message and ask the recommender for a reply.
    ///
    /// On failure the patient turn stays and no assistant turn is added; the
    /// session then accepts only `retry_pending` until a reply arrives.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn send_message(
        &self,
        session_id: Uuid,
        owner_id: &str,
        text: &str,
        requester_location: Option<GeoPoint>,
    ) -> Result<String, AssistantError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AssistantError::ValidationError("Message text is required".to_string()));
        }

        let entry = self.entry(session_id, owner_id).await?;
        let mut session = entry.session.lock().await;

        let history = session.turns().to_vec();
        session.append_patient(text)?;

        self.reply(&mut session, history, text.to_string(), requester_location).await
    }

    /// Re-request a reply for the trailing unanswered patient turn.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn retry_pending(
        &self,
        session_id: Uuid,
        owner_id: &str,
        requester_location: Option<GeoPoint>,
    ) -> Result<String, AssistantError> {
        let entry = self.entry(session_id, owner_id).await?;
        let mut session = entry.session.lock().await;

        let pending = session
            .pending_message()
            .map(str::to_string)
            .ok_or(AssistantError::NothingPending(session_id))?;
        let history = session.answered_history().to_vec();

        self.reply(&mut session, history, pending, requester_location).await
    }

    pub async fn close_session(&self, session_id: Uuid, owner_id: &str) -> Result<(), AssistantError> {
        self.entry(session_id, owner_id).await?;
        self.sessions.write().await.remove(&session_id);

        info!("Closed conversation session {}", session_id);
        Ok(())
    }

    async fn entry(&self, session_id: Uuid, owner_id: &str) -> Result<Arc<SessionEntry>, AssistantError> {
        let entry = self
            .sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(AssistantError::SessionNotFound(session_id))?;

        if entry.owner_id != owner_id {
            warn!("User {} attempted to use session {}", owner_id, session_id);
            return Err(AssistantError::Forbidden);
        }
        Ok(entry)
    }

    async fn reply(
        &self,
        session: &mut ConversationSession,
        history: Vec<ConversationTurn>,
        new_message: String,
        requester_location: Option<GeoPoint>,
    ) -> Result<String, AssistantError> {
        let doctor_roster = self.doctors.roster().await.map_err(|e| {
            warn!("Could not load doctor roster for session {}: {}", session.id, e);
            AssistantError::from(e)
        })?;

        let request = RecommendationRequest {
            doctor_roster,
            conversation_history: history,
            new_message,
            requester_location,
        };

        match self.client.recommend(&request).await {
            Ok(reply) => {
                session.append_assistant(reply.clone())?;
                debug!("Session {} now has {} turns", session.id, session.turns().len());
                Ok(reply)
            }
            Err(e) => {
                warn!("Recommendation failed for session {}: {}", session.id, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use async_trait::async_trait;
    use doctor_cell::models::Doctor;
    use doctor_cell::services::InMemoryDoctorRepository;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Replays canned outcomes and records every request it sees.
    #[derive(Default)]
    struct ScriptedClient {
        outcomes: Mutex<VecDeque<Result<String, AssistantError>>>,
        seen: Mutex<Vec<RecommendationRequest>>,
    }

    impl ScriptedClient {
        fn with(outcomes: Vec<Result<String, AssistantError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RecommendationClient for ScriptedClient {
        async fn recommend(&self, request: &RecommendationRequest) -> Result<String, AssistantError> {
            self.seen.lock().await.push(request.clone());
            self.outcomes
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok("default reply".to_string()))
        }
    }

    fn roster() -> Vec<Doctor> {
        vec![Doctor {
            id: Uuid::new_v4(),
            full_name: "Dr. Chat".to_string(),
            specialty: "General Practice".to_string(),
            bio: None,
            latitude: None,
            longitude: None,
            rating: 4.0,
            consultation_fee: 70.0,
            is_verified: true,
            profile_image: None,
        }]
    }

    fn service(client: Arc<ScriptedClient>) -> AssistantService {
        let doctors = DoctorService::new(Arc::new(InMemoryDoctorRepository::new(roster())));
        AssistantService::new(doctors, client)
    }

    /// Holds the first recommendation open until the test releases it.
    #[derive(Default)]
    struct GatedClient {
        calls: AtomicUsize,
        first_entered: Notify,
        release_first: Notify,
        seen: Mutex<Vec<RecommendationRequest>>,
    }

    #[async_trait]
    impl RecommendationClient for GatedClient {
        async fn recommend(&self, request: &RecommendationRequest) -> Result<String, AssistantError> {
            self.seen.lock().await.push(request.clone());
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == 1 {
                self.first_entered.notify_one();
                self.release_first.notified().await;
            }
            Ok(format!("reply {}", call))
        }
    }

    fn down() -> Result<String, AssistantError> {
        Err(AssistantError::ExternalService("down".to_string()))
    }

    #[tokio::test]
    async fn n_successful_sends_leave_2n_alternating_turns() {
        let client = ScriptedClient::default();
        let client = Arc::new(client);
        let service = service(client.clone());
        let id = service.create_session("p1").await;

        for i in 0..3 {
            service.send_message(id, "p1", &format!("message {}", i), None).await.unwrap();
        }

        let history = service.get_history(id, "p1").await.unwrap();
        assert_eq!(history.len(), 6);
        for (i, turn) in history.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::Patient } else { Role::Assistant };
            assert_eq!(turn.role, expected);
        }
    }

    #[tokio::test]
    async fn failed_send_leaves_2n_plus_one() {
        let client = ScriptedClient::with(vec![Ok("first reply".to_string()), down()]);
        let service = service(client);
        let id = service.create_session("p1").await;

        service.send_message(id, "p1", "hello", None).await.unwrap();
        let failed = service.send_message(id, "p1", "still there?", None).await;
        assert!(matches!(failed, Err(AssistantError::ExternalService(_))));

        let history = service.get_history(id, "p1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].role, Role::Patient);
        assert_eq!(history[2].text, "still there?");
    }

    #[tokio::test]
    async fn pending_turn_blocks_new_messages_until_retried() {
        let client = ScriptedClient::with(vec![down(), Ok("recovered".to_string())]);
        let service = service(client.clone());
        let id = service.create_session("p1").await;

        assert!(service.send_message(id, "p1", "help", None).await.is_err());
        assert!(matches!(
            service.send_message(id, "p1", "hello?", None).await,
            Err(AssistantError::ReplyPending(_))
        ));

        let reply = service.retry_pending(id, "p1", None).await.unwrap();
        assert_eq!(reply, "recovered");

        let history = service.get_history(id, "p1").await.unwrap();
        let texts: Vec<&str> = history.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["help", "recovered"]);

        // the retry resent the same message with the same (empty) prior history
        let seen = client.seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].new_message, "help");
        assert!(seen[1].conversation_history.is_empty());
    }

    #[tokio::test]
    async fn request_carries_roster_history_and_location() {
        let client = ScriptedClient::with(vec![Ok("a".to_string()), Ok("b".to_string())]);
        let service = service(client.clone());
        let id = service.create_session("p1").await;
        let here = GeoPoint::new(5.0, 6.0).unwrap();

        service.send_message(id, "p1", "first", None).await.unwrap();
        service.send_message(id, "p1", "second", Some(here)).await.unwrap();

        let seen = client.seen.lock().await;
        let last = &seen[1];
        assert_eq!(last.doctor_roster.len(), 1);
        assert_eq!(last.new_message, "second");
        let history: Vec<&str> = last.conversation_history.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(history, vec!["first", "a"]);
        assert_eq!(last.requester_location, Some(here));
    }

    #[tokio::test]
    async fn blank_text_is_rejected_without_appending() {
        let service = service(Arc::new(ScriptedClient::default()));
        let id = service.create_session("p1").await;

        assert!(matches!(
            service.send_message(id, "p1", "   ", None).await,
            Err(AssistantError::ValidationError(_))
        ));
        assert!(service.get_history(id, "p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_without_pending_turn_is_rejected() {
        let service = service(Arc::new(ScriptedClient::default()));
        let id = service.create_session("p1").await;
        assert!(matches!(
            service.retry_pending(id, "p1", None).await,
            Err(AssistantError::NothingPending(_))
        ));
    }

    #[tokio::test]
    async fn sessions_are_owned_and_independent() {
        let service = service(Arc::new(ScriptedClient::default()));
        let a = service.create_session("p1").await;
        let b = service.create_session("p2").await;

        service.send_message(a, "p1", "only in a", None).await.unwrap();
        assert_eq!(service.get_history(a, "p1").await.unwrap().len(), 2);
        assert!(service.get_history(b, "p2").await.unwrap().is_empty());

        assert!(matches!(service.get_history(a, "p2").await, Err(AssistantError::Forbidden)));
    }

    #[tokio::test]
    async fn closed_sessions_are_gone() {
        let service = service(Arc::new(ScriptedClient::default()));
        let id = service.create_session("p1").await;

        service.close_session(id, "p1").await.unwrap();
        assert!(matches!(
            service.get_history(id, "p1").await,
            Err(AssistantError::SessionNotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn overlapping_sends_on_one_session_are_serialized() {
        let client = Arc::new(GatedClient::default());
        let doctors = DoctorService::new(Arc::new(InMemoryDoctorRepository::new(roster())));
        let service = Arc::new(AssistantService::new(doctors, client.clone()));
        let id = service.create_session("p1").await;

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.send_message(id, "p1", "first", None).await }
        });
        client.first_entered.notified().await;

        let second = tokio::spawn({
            let service = service.clone();
            async move { service.send_message(id, "p1", "second", None).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        // The second send is parked behind the first one's session lock.
        assert_eq!(client.seen.lock().await.len(), 1);

        client.release_first.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), "reply 1");
        assert_eq!(second.await.unwrap().unwrap(), "reply 2");

        let history = service.get_history(id, "p1").await.unwrap();
        let turns: Vec<(Role, &str)> = history.iter().map(|t| (t.role, t.text.as_str())).collect();
        assert_eq!(
            turns,
            vec![
                (Role::Patient, "first"),
                (Role::Assistant, "reply 1"),
                (Role::Patient, "second"),
                (Role::Assistant, "reply 2"),
            ]
        );

        let seen = client.seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert!(seen[0].conversation_history.is_empty());
        assert_eq!(seen[1].new_message, "second");
        let prior: Vec<&str> = seen[1].conversation_history.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(prior, vec!["first", "reply 1"]);
    }
}
