use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tickets::Ticket;
use crate::util::truncate;

const SUBJECT_DISPLAY_LEN: usize = 45;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartmentGroup {
    pub title: String,
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Clone, Default)]
pub struct DepartmentGroups {
    groups: Vec<DepartmentGroup>,
    index: HashMap<String, usize>,
}

impl DepartmentGroups {
    pub fn groups(&self) -> &[DepartmentGroup] {
        &self.groups
    }

    fn push(&mut self, ticket: Ticket) {
        let idx = match self.index.get(&ticket.department_title) {
            Some(idx) => *idx,
            None => {
                let idx = self.groups.len();
                self.index.insert(ticket.department_title.clone(), idx);
                self.groups.push(DepartmentGroup {
                    title: ticket.department_title.clone(),
                    tickets: Vec::new(),
                });
                idx
            }
        };
        self.groups[idx].tickets.push(ticket);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDetail {
    pub id: String,
    pub subject: String,
    #[serde(rename = "userorganization")]
    pub user_organization: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub level: String,
    pub value: usize,
    pub details: Vec<TicketDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Summary {
    pub levels: Vec<Level>,
    pub total: usize,
}

pub fn group_by_department(tickets: Vec<Ticket>) -> DepartmentGroups {
    let mut groups = DepartmentGroups::default();
    for ticket in tickets {
        groups.push(ticket);
    }
    groups
}

pub fn summarize(groups: &DepartmentGroups) -> Summary {
    let levels: Vec<Level> = groups
        .groups()
        .iter()
        .map(|group| {
            let details: Vec<TicketDetail> = group
                .tickets
                .iter()
                .map(|ticket| TicketDetail {
                    id: ticket.id.clone(),
                    subject: ticket.subject.clone(),
                    user_organization: ticket.user_organization.clone(),
                })
                .collect();
            Level {
                level: group.title.clone(),
                value: details.len(),
                details,
            }
        })
        .collect();
    let total = levels.iter().map(|level| level.value).sum();
    Summary { levels, total }
}

pub fn ticket_view_url(staff_url: &str, id: &str) -> String {
    format!(
        "{}?/Tickets/Ticket/View/{id}",
        staff_url.trim_end_matches('?')
    )
}

pub fn render_text(summary: &Summary, staff_url: &str) -> String {
    let mut out = String::new();
    for level in &summary.levels {
        out.push_str(&format!("{} ({})\n", level.level, level.value));
        for detail in &level.details {
            out.push_str(&format!(
                "  #{} {} [{}]\n",
                detail.id,
                truncate(&detail.subject, SUBJECT_DISPLAY_LEN),
                detail.user_organization
            ));
            out.push_str(&format!("      {}\n", ticket_view_url(staff_url, &detail.id)));
        }
    }
    out.push_str(&format!("Total open: {}\n", summary.total));
    out
}
