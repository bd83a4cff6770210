use quick_xml::Reader;
use quick_xml::events::Event;
use quick_xml::name::QName;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::TicketService;
use crate::error::{PollError, PollResult};
use crate::session::SessionToken;
use crate::validator;

pub const DEFAULT_SUBJECT: &str = "No subject";
pub const DEFAULT_DEPARTMENT_TITLE: &str = "Unknown department";
pub const DEFAULT_USER_ORGANIZATION: &str = "Unknown organization";
const TICKET_TAG: &[u8] = b"ticket";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    pub subject: String,
    pub department_title: String,
    pub user_organization: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketRecord {
    #[serde(rename = "@id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub departmenttitle: Option<String>,
    #[serde(default)]
    pub userorganization: Option<String>,
}

#[derive(Debug, Error)]
pub enum TicketXmlError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    #[error(transparent)]
    Record(#[from] quick_xml::DeError),
    #[error("{0}")]
    Structure(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Complete(Vec<Ticket>),
    Expired { department_id: String },
}

impl Ticket {
    // Blank optional fields get placeholders; a missing id stays empty.
    pub fn from_record(record: TicketRecord) -> Self {
        Self {
            id: record.id.unwrap_or_default(),
            subject: present(record.subject).unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            department_title: present(record.departmenttitle)
                .unwrap_or_else(|| DEFAULT_DEPARTMENT_TITLE.to_string()),
            user_organization: present(record.userorganization)
                .unwrap_or_else(|| DEFAULT_USER_ORGANIZATION.to_string()),
        }
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn decode_ticket_records(body: &str) -> Result<Vec<TicketRecord>, TicketXmlError> {
    let mut reader = Reader::from_str(body);
    let mut records = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        let start = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => {
                if depth == 0 {
                    if seen_root {
                        return Err(TicketXmlError::Structure("multiple root elements"));
                    }
                    seen_root = true;
                    depth = 1;
                } else if e.name().as_ref() == TICKET_TAG {
                    let name = e.name().as_ref().to_vec();
                    reader.read_to_end(QName(&name))?;
                    let end = reader.buffer_position() as usize;
                    records.push(quick_xml::de::from_str(&body[start..end])?);
                } else {
                    depth += 1;
                }
            }
            Event::Empty(e) => {
                if depth == 0 {
                    if seen_root {
                        return Err(TicketXmlError::Structure("multiple root elements"));
                    }
                    seen_root = true;
                } else if e.name().as_ref() == TICKET_TAG {
                    let end = reader.buffer_position() as usize;
                    records.push(quick_xml::de::from_str(&body[start..end])?);
                }
            }
            Event::End(_) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(TicketXmlError::Structure("unbalanced closing tag"))?;
            }
            Event::Text(t) => {
                if depth == 0 && !t.iter().all(u8::is_ascii_whitespace) {
                    return Err(TicketXmlError::Structure("text outside the root element"));
                }
            }
            _ => {}
        }
    }

    if !seen_root {
        return Err(TicketXmlError::Structure("no root element"));
    }
    if depth != 0 {
        return Err(TicketXmlError::Structure("unclosed root element"));
    }
    Ok(records)
}

pub fn decode_tickets(department_id: &str, body: &str) -> PollResult<Vec<Ticket>> {
    let records = decode_ticket_records(body).map_err(|err| {
        PollError::protocol(
            format!("department {department_id}"),
            format!("malformed ticket XML: {err}"),
        )
    })?;
    let tickets: Vec<Ticket> = records.into_iter().map(Ticket::from_record).collect();
    let missing_ids = tickets.iter().filter(|t| t.id.is_empty()).count();
    if missing_ids > 0 {
        warn!(department = %department_id, count = missing_ids, "tickets without id attribute");
    }
    Ok(tickets)
}

pub fn fetch_open_tickets<C>(
    client: &C,
    token: &SessionToken,
    department_ids: &[String],
    status_id: &str,
) -> PollResult<FetchOutcome>
where
    C: TicketService + ?Sized,
{
    let mut all = Vec::new();
    for department_id in department_ids {
        let response = client.retrieve(token, department_id, status_id)?;

        if !validator::is_usable(&response.body) {
            info!(department = %department_id, "session expiry signalled");
            return Ok(FetchOutcome::Expired {
                department_id: department_id.clone(),
            });
        }

        if !response.is_success() {
            return Err(PollError::transport(
                "ticket retrieval",
                format!(
                    "server returned HTTP {} for department {department_id}",
                    response.status
                ),
            ));
        }

        let tickets = decode_tickets(department_id, &response.body)?;
        debug!(department = %department_id, count = tickets.len(), "decoded tickets");
        all.extend(tickets);
    }
    Ok(FetchOutcome::Complete(all))
}
