use crate::error::AssemblyError;
use crate::model::{ContextFile, Snippet};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;

/// Serialize instructions and files into the canonical prompt document:
///
/// ```text
/// <instructions>
///   <objective>...</objective>
/// </instructions>
/// <context>
///   <file name="..." path="..." status="..." tokens="...">
/// ...content...
///   </file>
/// </context>
/// ```
///
/// The `<instructions>` block is omitted when there are none. Text and
/// attribute values go through quick-xml's escaping (all five reserved
/// characters); characters XML 1.0 cannot carry at all become U+FFFD.
pub fn render(instructions: &[Snippet], files: &[ContextFile]) -> Result<String, AssemblyError> {
    let mut writer = Writer::new(Vec::new());

    if !instructions.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("instructions")))?;
        for snippet in instructions {
            let tag = tag_name(&snippet.key);
            write_raw_ws(&mut writer, "\n  ")?;
            writer.write_event(Event::Start(BytesStart::new(tag.as_str())))?;
            writer.write_event(Event::Text(BytesText::new(&sanitize(&snippet.text))))?;
            writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
        }
        write_raw_ws(&mut writer, "\n")?;
        writer.write_event(Event::End(BytesEnd::new("instructions")))?;
        write_raw_ws(&mut writer, "\n")?;
    }

    writer.write_event(Event::Start(BytesStart::new("context")))?;
    for file in files {
        write_raw_ws(&mut writer, "\n  ")?;

        let name = file.display_name();
        let path = file.display_path();
        let tokens = file.tokens.to_string();
        let mut el = BytesStart::new("file");
        el.push_attribute(("name", &*sanitize(&name)));
        el.push_attribute(("path", &*sanitize(&path)));
        el.push_attribute(("status", file.status.as_str()));
        el.push_attribute(("tokens", tokens.as_str()));
        writer.write_event(Event::Start(el))?;

        write_raw_ws(&mut writer, "\n")?;
        if let Some(content) = file.content.as_deref() {
            writer.write_event(Event::Text(BytesText::new(&sanitize(content))))?;
        }
        write_raw_ws(&mut writer, "\n  ")?;
        writer.write_event(Event::End(BytesEnd::new("file")))?;
    }
    write_raw_ws(&mut writer, "\n")?;
    writer.write_event(Event::End(BytesEnd::new("context")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

fn write_raw_ws(writer: &mut Writer<Vec<u8>>, ws: &str) -> Result<(), AssemblyError> {
    writer.write_event(Event::Text(BytesText::from_escaped(ws)))?;
    Ok(())
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Replace characters XML 1.0 forbids (most C0 controls, U+FFFE, U+FFFF).
pub fn sanitize(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.chars()
            .map(|c| if is_xml_char(c) { c } else { '\u{FFFD}' })
            .collect(),
    )
}

/// Snippet keys become element names: anything outside `[A-Za-z0-9_.-]` is
/// replaced with `_`, and a leading digit, dot or dash gets a `_` prefix.
pub fn tag_name(key: &str) -> String {
    let mut name: String = key
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let starts_ok = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !starts_ok {
        name.insert(0, '_');
    }
    name
}
