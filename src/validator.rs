use std::mem;

use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;

const STATUS_TAG: &[u8] = b"status";
pub const EXPIRED_SENTINEL: &[u8] = b"-2";

pub fn is_usable(body: &str) -> bool {
    match first_status_text(body) {
        Some(Some(text)) => text != EXPIRED_SENTINEL,
        _ => true,
    }
}

// None: not well formed. Some(None): no status element.
fn first_status_text(body: &str) -> Option<Option<Vec<u8>>> {
    let mut reader = Reader::from_str(body);
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut status: Option<Vec<u8>> = None;
    let mut capture_depth: Option<usize> = None;
    let mut text = Vec::new();

    loop {
        match reader.read_event() {
            Err(_) => return None,
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                if capture_depth.take().is_some() {
                    status = Some(mem::take(&mut text));
                }
                if depth == 0 {
                    if seen_root {
                        return None;
                    }
                    seen_root = true;
                } else if status.is_none() && e.name().as_ref() == STATUS_TAG {
                    capture_depth = Some(depth + 1);
                }
                depth += 1;
            }
            Ok(Event::Empty(e)) => {
                if capture_depth.take().is_some() {
                    status = Some(mem::take(&mut text));
                }
                if depth == 0 {
                    if seen_root {
                        return None;
                    }
                    seen_root = true;
                } else if status.is_none() && e.name().as_ref() == STATUS_TAG {
                    status = Some(Vec::new());
                }
            }
            Ok(Event::End(_)) => {
                if capture_depth == Some(depth) {
                    capture_depth = None;
                    status = Some(mem::take(&mut text));
                }
                depth = depth.checked_sub(1)?;
            }
            Ok(Event::Text(t)) => {
                if capture_depth.is_some() {
                    text.extend_from_slice(&t);
                } else if depth == 0 && !t.iter().all(u8::is_ascii_whitespace) {
                    return None;
                }
            }
            Ok(Event::CData(c)) => {
                if capture_depth.is_some() {
                    text.extend_from_slice(&c);
                }
            }
            Ok(Event::GeneralRef(r)) => {
                // Undefined entities make the document malformed.
                let resolved = match r.resolve_char_ref() {
                    Ok(Some(ch)) => ch.to_string(),
                    Ok(None) => {
                        let name = r.decode().ok()?;
                        resolve_predefined_entity(&name)?.to_string()
                    }
                    Err(_) => return None,
                };
                if capture_depth.is_some() {
                    text.extend_from_slice(resolved.as_bytes());
                }
            }
            Ok(_) => {}
        }
    }

    if depth != 0 || !seen_root {
        return None;
    }
    Some(status)
}
