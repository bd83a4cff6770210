use tracing::{debug, info};

use crate::auth;
use crate::client::TicketService;
use crate::config::PollSettings;
use crate::error::{PollError, PollResult};
use crate::session::{SessionStore, SessionToken};
use crate::summary::{self, Summary};
use crate::tickets::{self, FetchOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NoSession,
    HasSession,
    Fetching,
    Reauth,
    Done,
    Failed,
}

pub struct Orchestrator<C, S> {
    settings: PollSettings,
    client: C,
    store: S,
    state: RunState,
}

impl<C, S> Orchestrator<C, S>
where
    C: TicketService,
    S: SessionStore,
{
    pub fn new(settings: PollSettings, client: C, store: S) -> Self {
        Self {
            settings,
            client,
            store,
            state: RunState::NoSession,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    #[cfg(test)]
    fn client(&self) -> &C {
        &self.client
    }

    #[cfg(test)]
    fn store(&self) -> &S {
        &self.store
    }

    pub fn run(&mut self) -> PollResult<Summary> {
        match self.drive() {
            Ok(summary) => {
                self.transition(RunState::Done);
                Ok(summary)
            }
            Err(err) => {
                self.transition(RunState::Failed);
                Err(err)
            }
        }
    }

    pub fn login(&mut self) -> PollResult<SessionToken> {
        let token = self.authenticate()?;
        self.transition(RunState::HasSession);
        Ok(token)
    }

    fn drive(&mut self) -> PollResult<Summary> {
        let token = match self.store.load()? {
            Some(token) => {
                debug!(token_len = token.len(), "using cached session");
                token
            }
            None => {
                info!("no cached session, authenticating");
                self.authenticate()?
            }
        };
        self.transition(RunState::HasSession);

        let tickets = match self.fetch(&token)? {
            FetchOutcome::Complete(tickets) => tickets,
            FetchOutcome::Expired { department_id } => {
                self.transition(RunState::Reauth);
                info!(department = %department_id, "session expired, re-authenticating once");
                let token = self.authenticate()?;
                self.transition(RunState::HasSession);
                match self.fetch(&token)? {
                    FetchOutcome::Complete(tickets) => tickets,
                    FetchOutcome::Expired { department_id } => {
                        return Err(PollError::SessionExpired { department_id });
                    }
                }
            }
        };

        let groups = summary::group_by_department(tickets);
        Ok(summary::summarize(&groups))
    }

    fn fetch(&mut self, token: &SessionToken) -> PollResult<FetchOutcome> {
        self.transition(RunState::Fetching);
        tickets::fetch_open_tickets(
            &self.client,
            token,
            &self.settings.department_ids,
            &self.settings.open_status_id,
        )
    }

    fn authenticate(&mut self) -> PollResult<SessionToken> {
        auth::authenticate(
            &self.client,
            &mut self.store,
            self.settings.credentials.as_ref(),
        )
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "poll state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RawResponse;
    use crate::config::Credentials;
    use crate::summary::Level;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    const OLD_TOKEN: &str = "oldoldoldoldoldoldoldoldoldold12";
    const NEW_TOKEN: &str = "newnewnewnewnewnewnewnewnewnew34";
    const EXPIRED: &str = "<kayako_staffapi><status>-2</status></kayako_staffapi>";

    // Retrievals pop the next response queued for the requested department.
    #[derive(Default)]
    struct ScriptedService {
        logins: RefCell<VecDeque<RawResponse>>,
        retrievals: RefCell<VecDeque<(String, RawResponse)>>,
        login_calls: Cell<usize>,
        retrieve_log: RefCell<Vec<(String, String)>>,
    }

    impl ScriptedService {
        fn login_with(self, body: &str) -> Self {
            self.logins.borrow_mut().push_back(RawResponse::ok(body));
            self
        }

        fn respond(self, department: &str, body: &str) -> Self {
            self.retrievals
                .borrow_mut()
                .push_back((department.to_string(), RawResponse::ok(body)));
            self
        }

        fn retrieve_calls(&self) -> usize {
            self.retrieve_log.borrow().len()
        }
    }

    impl TicketService for ScriptedService {
        fn login(&self, _credentials: &Credentials) -> PollResult<RawResponse> {
            self.login_calls.set(self.login_calls.get() + 1);
            Ok(self
                .logins
                .borrow_mut()
                .pop_front()
                .expect("unexpected login call"))
        }

        fn retrieve(
            &self,
            token: &SessionToken,
            department_id: &str,
            _status_id: &str,
        ) -> PollResult<RawResponse> {
            self.retrieve_log
                .borrow_mut()
                .push((token.as_str().to_string(), department_id.to_string()));
            let (expected, response) = self
                .retrievals
                .borrow_mut()
                .pop_front()
                .expect("unexpected retrieve call");
            assert_eq!(expected, department_id, "departments queried out of order");
            Ok(response)
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        initial: Option<SessionToken>,
        saved: Vec<SessionToken>,
    }

    impl MemoryStore {
        fn with_token(token: &str) -> Self {
            Self {
                initial: Some(SessionToken::new(token)),
                saved: Vec::new(),
            }
        }
    }

    impl SessionStore for MemoryStore {
        fn load(&self) -> PollResult<Option<SessionToken>> {
            Ok(self.saved.last().cloned().or_else(|| self.initial.clone()))
        }

        fn save(&mut self, token: &SessionToken) -> PollResult<()> {
            self.saved.push(token.clone());
            Ok(())
        }
    }

    fn settings(departments: &[&str]) -> PollSettings {
        PollSettings {
            credentials: Some(Credentials {
                username: "agent".to_string(),
                password: "secret".to_string(),
            }),
            department_ids: departments.iter().map(|d| d.to_string()).collect(),
            open_status_id: "4".to_string(),
        }
    }

    fn tickets_xml(tickets: &[(&str, &str)]) -> String {
        let mut xml = String::from("<tickets>");
        for (id, department) in tickets {
            xml.push_str(&format!(
                "<ticket id=\"{id}\"><subject>Issue {id}</subject><departmenttitle>{department}</departmenttitle><userorganization>Org {id}</userorganization></ticket>"
            ));
        }
        xml.push_str("</tickets>");
        xml
    }

    fn login_body(token: &str) -> String {
        format!("<kayako_staffapi><status>1</status><sessionid>{token}</sessionid></kayako_staffapi>")
    }

    #[test]
    fn absent_cache_authenticates_once_then_summarizes() {
        let service = ScriptedService::default()
            .login_with(&login_body(NEW_TOKEN))
            .respond("6", &tickets_xml(&[("1", "Support")]))
            .respond("11", &tickets_xml(&[("2", "Billing"), ("3", "Support")]));
        let mut orchestrator =
            Orchestrator::new(settings(&["6", "11"]), service, MemoryStore::default());

        let summary = orchestrator.run().expect("summary");

        assert_eq!(orchestrator.state(), RunState::Done);
        assert_eq!(orchestrator.client().login_calls.get(), 1);
        assert_eq!(orchestrator.store().saved, vec![SessionToken::new(NEW_TOKEN)]);
        assert!(
            orchestrator
                .client()
                .retrieve_log
                .borrow()
                .iter()
                .all(|(token, _)| token == NEW_TOKEN)
        );
        let titles: Vec<&str> = summary.levels.iter().map(|l| l.level.as_str()).collect();
        assert_eq!(titles, vec!["Support", "Billing"]);
        assert_eq!(summary.levels[0].value, 2);
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn cached_session_is_reused_without_login() {
        let service = ScriptedService::default().respond("6", &tickets_xml(&[("1", "Support")]));
        let mut orchestrator =
            Orchestrator::new(settings(&["6"]), service, MemoryStore::with_token(OLD_TOKEN));

        let summary = orchestrator.run().expect("summary");

        assert_eq!(summary.total, 1);
        assert_eq!(orchestrator.client().login_calls.get(), 0);
        assert!(orchestrator.store().saved.is_empty());
    }

    #[test]
    fn expiry_triggers_one_reauth_and_a_full_refetch() {
        let service = ScriptedService::default()
            .respond("6", &tickets_xml(&[("1", "Support")]))
            .respond("11", EXPIRED)
            .login_with(&login_body(NEW_TOKEN))
            .respond("6", &tickets_xml(&[("1", "Support")]))
            .respond("11", &tickets_xml(&[("2", "Billing")]));
        let mut orchestrator = Orchestrator::new(
            settings(&["6", "11"]),
            service,
            MemoryStore::with_token(OLD_TOKEN),
        );

        let summary = orchestrator.run().expect("summary");

        assert_eq!(orchestrator.state(), RunState::Done);
        assert_eq!(orchestrator.client().login_calls.get(), 1);
        assert_eq!(orchestrator.store().saved, vec![SessionToken::new(NEW_TOKEN)]);
        let log = orchestrator.client().retrieve_log.borrow().clone();
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].0, OLD_TOKEN);
        assert_eq!(log[1].0, OLD_TOKEN);
        assert_eq!(log[2].0, NEW_TOKEN);
        assert_eq!(log[3].0, NEW_TOKEN);
        assert_eq!(summary.total, 2);
    }

    #[test]
    fn first_run_expiry_writes_the_cache_twice() {
        let service = ScriptedService::default()
            .login_with(&login_body(OLD_TOKEN))
            .respond("11", EXPIRED)
            .login_with(&login_body(NEW_TOKEN))
            .respond("11", &tickets_xml(&[("5", "Billing")]));
        let mut orchestrator =
            Orchestrator::new(settings(&["11"]), service, MemoryStore::default());

        orchestrator.run().expect("summary");

        assert_eq!(
            orchestrator.store().saved,
            vec![SessionToken::new(OLD_TOKEN), SessionToken::new(NEW_TOKEN)]
        );
        assert_eq!(orchestrator.client().login_calls.get(), 2);
    }

    #[test]
    fn second_expiry_fails_without_a_third_attempt() {
        let service = ScriptedService::default()
            .respond("6", EXPIRED)
            .login_with(&login_body(NEW_TOKEN))
            .respond("6", EXPIRED);
        let mut orchestrator = Orchestrator::new(
            settings(&["6", "11"]),
            service,
            MemoryStore::with_token(OLD_TOKEN),
        );

        let err = orchestrator.run().expect_err("expired twice");

        assert!(matches!(err, PollError::SessionExpired { .. }));
        assert!(err.to_string().contains("expired"));
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert_eq!(orchestrator.client().login_calls.get(), 1);
        assert_eq!(orchestrator.client().retrieve_calls(), 2);
    }

    #[test]
    fn malformed_department_discards_earlier_results() {
        let service = ScriptedService::default()
            .respond("6", &tickets_xml(&[("1", "Support")]))
            .respond("11", "<tickets><ticket id=\"2\"><subject>broken</tickets>");
        let mut orchestrator = Orchestrator::new(
            settings(&["6", "11", "70"]),
            service,
            MemoryStore::with_token(OLD_TOKEN),
        );

        let err = orchestrator.run().expect_err("protocol error");

        assert!(matches!(err, PollError::Protocol { .. }));
        assert!(err.to_string().contains("department 11"));
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert_eq!(orchestrator.client().login_calls.get(), 0);
        assert_eq!(orchestrator.client().retrieve_calls(), 2);
    }

    #[test]
    fn transport_failure_is_not_retried() {
        let service = ScriptedService::default();
        service
            .retrievals
            .borrow_mut()
            .push_back(("6".to_string(), RawResponse::new(502, "Bad Gateway")));
        let mut orchestrator =
            Orchestrator::new(settings(&["6"]), service, MemoryStore::with_token(OLD_TOKEN));

        let err = orchestrator.run().expect_err("transport error");

        assert!(matches!(err, PollError::Transport { .. }));
        assert_eq!(orchestrator.client().login_calls.get(), 0);
    }

    #[test]
    fn failed_login_is_fatal() {
        let service = ScriptedService::default().login_with("<error>Invalid credentials</error>");
        let mut orchestrator =
            Orchestrator::new(settings(&["6"]), service, MemoryStore::default());

        let err = orchestrator.run().expect_err("auth error");

        assert!(matches!(err, PollError::Auth { .. }));
        assert_eq!(orchestrator.client().retrieve_calls(), 0);
    }

    #[test]
    fn groups_follow_returned_titles_across_departments() {
        let service = ScriptedService::default()
            .respond("6", &tickets_xml(&[("1", "Support"), ("2", "Support")]))
            .respond("11", &tickets_xml(&[("3", "Billing")]));
        let mut orchestrator = Orchestrator::new(
            settings(&["6", "11"]),
            service,
            MemoryStore::with_token(OLD_TOKEN),
        );

        let summary = orchestrator.run().expect("summary");

        assert_eq!(summary.total, 3);
        assert_eq!(summary.levels.len(), 2);
        let Level {
            level,
            value,
            details,
        } = &summary.levels[0];
        assert_eq!(level, "Support");
        assert_eq!(*value, 2);
        let ids: Vec<&str> = details.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(summary.levels[1].level, "Billing");
        assert_eq!(summary.levels[1].value, 1);
        assert_eq!(summary.levels[1].details[0].user_organization, "Org 3");
    }

    #[test]
    fn explicit_login_replaces_cached_token() {
        let service = ScriptedService::default().login_with(&login_body(NEW_TOKEN));
        let mut orchestrator =
            Orchestrator::new(settings(&["6"]), service, MemoryStore::with_token(OLD_TOKEN));

        let token = orchestrator.login().expect("login");

        assert_eq!(token.as_str(), NEW_TOKEN);
        assert_eq!(
            orchestrator.store().load().expect("load"),
            Some(SessionToken::new(NEW_TOKEN))
        );
    }
}
