use crate::error::{ModStageError, Result};
use crate::scanner::OutputScanner;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::path::Path;

/// Fragments worth patching carry this marker in their file name; the other
/// fragments of a vehicle are left to manual editing.
pub const FRAGMENT_OF_INTEREST: &str = "vehicle_misc_esi";

const DEFAULT_ATTR: &[u8] = b"z_default";

/// Target values applied to matching elements, as literal strings. The
/// patcher never formats or rounds; the element text and the `z_default`
/// attribute both receive the identical literal.
const PERFORMANCE_TABLE: &[(&str, &str)] = &[
    ("official_top_speed", "1500"),
    ("full_nitro_refill_time", "1"),
    ("full_nitro_refill_time_lvl2", "0.005"),
    ("full_nitro_use_time", "12000"),
    ("full_nitro_use_time_upgraded", "15000"),
    ("full_nitro_use_time_upgraded_lvl2", "22000"),
    ("turbo_jump_cooldown", "0.5"),
    ("turbo_jump_cooldown_upgraded", "0.005"),
];

fn target_value(name: &str) -> Option<&'static str> {
    PERFORMANCE_TABLE
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, value)| *value)
}

#[derive(Debug, Clone)]
pub struct PatchedFragment {
    pub content: String,
    pub elements_patched: usize,
}

/// Result of patching every staged fragment of interest.
#[derive(Debug, Default, Clone)]
pub struct PatchSummary {
    pub files_patched: usize,
    pub elements_patched: usize,
    pub errors: Vec<String>,
}

/// Rewrite a fragment, setting the text and `z_default` of every element
/// whose `name` attribute appears in the performance table. Elements with
/// unrecognized names round-trip untouched. Markup that is not well-formed
/// fails the whole fragment; nothing partial is produced.
pub fn patch_fragment(label: &str, input: &str) -> Result<PatchedFragment> {
    patch_events(input).map_err(|message| ModStageError::MalformedFragment {
        path: label.to_string(),
        message,
    })
}

/// Patch one fragment file in place. The file is only rewritten after the
/// whole patch succeeded.
pub fn patch_file(path: &Path) -> Result<usize> {
    let input = fs::read_to_string(path)?;
    let patched = patch_fragment(&path.display().to_string(), &input)?;
    fs::write(path, patched.content)?;
    Ok(patched.elements_patched)
}

/// Patch every staged fragment of interest under `to_edit`. A malformed
/// fragment fails atomically and is reported without touching the others.
pub fn patch_staged(to_edit: &Path, fragment_extension: &str) -> PatchSummary {
    let mut summary = PatchSummary::default();

    for staged in OutputScanner::new(fragment_extension).scan(to_edit) {
        if !staged.filename.contains(FRAGMENT_OF_INTEREST) {
            continue;
        }

        match patch_file(&staged.path) {
            Ok(elements) => {
                summary.files_patched += 1;
                summary.elements_patched += elements;
            }
            Err(e) => summary.errors.push(e.to_string()),
        }
    }

    summary
}

fn patch_events(input: &str) -> std::result::Result<PatchedFragment, String> {
    let mut reader = Reader::from_str(input);
    let mut writer = Writer::new(Vec::new());
    let mut elements_patched = 0usize;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(start) => {
                if let Some(value) = patch_target(&start)? {
                    write_patched(&mut writer, &start, value)?;
                    skip_original_content(&mut reader)?;
                    elements_patched += 1;
                } else {
                    writer
                        .write_event(Event::Start(start))
                        .map_err(|e| e.to_string())?;
                }
            }
            Event::Empty(start) => {
                if let Some(value) = patch_target(&start)? {
                    write_patched(&mut writer, &start, value)?;
                    elements_patched += 1;
                } else {
                    writer
                        .write_event(Event::Empty(start))
                        .map_err(|e| e.to_string())?;
                }
            }
            Event::Eof => break,
            event => writer.write_event(event).map_err(|e| e.to_string())?,
        }
    }

    let content = String::from_utf8(writer.into_inner())
        .map_err(|e| format!("patched output is not UTF-8: {}", e))?;

    Ok(PatchedFragment {
        content,
        elements_patched,
    })
}

fn patch_target(start: &BytesStart) -> std::result::Result<Option<&'static str>, String> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.as_ref() == b"name" {
            let name = attr.unescape_value().map_err(|e| e.to_string())?;
            return Ok(target_value(&name));
        }
    }
    Ok(None)
}

fn write_patched(
    writer: &mut Writer<Vec<u8>>,
    start: &BytesStart,
    value: &str,
) -> std::result::Result<(), String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut elem = BytesStart::new(name.clone());

    let mut has_default = false;
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.as_ref() == DEFAULT_ATTR {
            elem.push_attribute((DEFAULT_ATTR, value.as_bytes()));
            has_default = true;
        } else {
            elem.push_attribute(attr);
        }
    }
    if !has_default {
        elem.push_attribute((DEFAULT_ATTR, value.as_bytes()));
    }

    writer
        .write_event(Event::Start(elem))
        .map_err(|e| e.to_string())?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(|e| e.to_string())?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// Drop the original content of a patched element up to its end tag.
fn skip_original_content(reader: &mut Reader<&[u8]>) -> std::result::Result<(), String> {
    let mut depth = 1usize;
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => return Err("unexpected end of fragment".to_string()),
            _ => {}
        }
    }
}
