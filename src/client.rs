use std::io::Read;
use std::time::Duration;

use tracing::debug;

use crate::config::Credentials;
use crate::error::{PollError, PollResult};
use crate::session::SessionToken;

const LOGIN_ROUTE: &str = "/Core/Default/Login";
const RETRIEVE_ROUTE: &str = "/Tickets/Retrieve";
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait TicketService {
    fn login(&self, credentials: &Credentials) -> PollResult<RawResponse>;

    fn retrieve(
        &self,
        token: &SessionToken,
        department_id: &str,
        status_id: &str,
    ) -> PollResult<RawResponse>;
}

pub struct HttpTicketService {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpTicketService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}?{}", self.base_url.trim_end_matches('?'), route)
    }

    fn post_form(&self, call: &str, route: &str, form: &[(&str, &str)]) -> PollResult<RawResponse> {
        let url = self.endpoint(route);
        debug!(call, url = %url, "sending request");
        let result = self
            .agent
            .post(&url)
            .set("Accept-Encoding", "gzip, deflate")
            .send_form(form);

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => return Err(PollError::transport(call, err)),
        };

        let status = response.status();
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|err| PollError::transport(call, format!("failed to read body: {err}")))?;
        debug!(call, status, bytes = bytes.len(), "response received");

        Ok(RawResponse {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

impl TicketService for HttpTicketService {
    fn login(&self, credentials: &Credentials) -> PollResult<RawResponse> {
        self.post_form(
            "login",
            LOGIN_ROUTE,
            &[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ],
        )
    }

    fn retrieve(
        &self,
        token: &SessionToken,
        department_id: &str,
        status_id: &str,
    ) -> PollResult<RawResponse> {
        self.post_form(
            "ticket retrieval",
            RETRIEVE_ROUTE,
            &[
                ("sessionid", token.as_str()),
                ("departmentid", department_id),
                ("statusid", status_id),
            ],
        )
    }
}
