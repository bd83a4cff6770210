use std::sync::OnceLock;

use regex_lite::Regex;
use tracing::{debug, info};

use crate::client::TicketService;
use crate::config::Credentials;
use crate::error::{PollError, PollResult};
use crate::session::{SessionStore, SessionToken};

pub const TOKEN_LEN: usize = 32;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!("[A-Za-z0-9]{{{TOKEN_LEN}}}")).expect("valid token pattern")
    })
}

pub fn extract_token(body: &str) -> Option<SessionToken> {
    token_pattern()
        .find(body)
        .map(|m| SessionToken::new(m.as_str()))
}

pub fn authenticate<C, S>(
    client: &C,
    store: &mut S,
    credentials: Option<&Credentials>,
) -> PollResult<SessionToken>
where
    C: TicketService + ?Sized,
    S: SessionStore + ?Sized,
{
    let Some(credentials) = credentials else {
        return Err(PollError::auth(
            "credentials are not configured (set KAYAKO_USERNAME and KAYAKO_PASSWORD)",
        ));
    };

    let response = client.login(credentials)?;
    if !response.is_success() {
        return Err(PollError::transport(
            "login",
            format!("server returned HTTP {}", response.status),
        ));
    }

    let token = extract_token(&response.body)
        .ok_or_else(|| PollError::auth("token not found in login response"))?;
    debug!(token_len = token.len(), "login returned a session token");

    store.save(&token)?;
    info!("authenticated and cached new session");
    Ok(token)
}
