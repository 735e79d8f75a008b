//! Structural SVG simplification: comments and inter-element whitespace are
//! dropped and attributes are sorted alphabetically.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

fn sorted(elem: &BytesStart<'_>) -> Result<BytesStart<'static>, String> {
    let mut attributes = Vec::new();
    for attribute in elem.attributes() {
        let attribute = attribute.map_err(|e| format!("malformed attribute: {e}"))?;
        attributes.push((attribute.key.as_ref().to_vec(), attribute.value.into_owned()));
    }
    attributes.sort();

    let name = String::from_utf8_lossy(elem.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for (key, value) in &attributes {
        out.push_attribute((key.as_slice(), value.as_slice()));
    }
    Ok(out)
}

pub fn optimize_svg(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new(Vec::with_capacity(bytes.len()));
    let mut saw_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("invalid SVG at {}: {e}", reader.error_position()))?;
        let result = match event {
            Event::Eof => break,
            Event::Comment(_) => continue,
            Event::Start(elem) => {
                saw_root = true;
                writer.write_event(Event::Start(sorted(&elem)?))
            }
            Event::Empty(elem) => {
                saw_root = true;
                writer.write_event(Event::Empty(sorted(&elem)?))
            }
            other => writer.write_event(other),
        };
        result.map_err(|e| format!("failed to write SVG: {e}"))?;
    }

    if !saw_root {
        return Err("no SVG element found".to_string());
    }
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comments_and_sorts_attributes() {
        let svg = br#"<?xml version="1.0"?>
<!-- exported by an editor -->
<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
    <rect y="1" x="0" fill="red"/>
</svg>
"#;
        let out = String::from_utf8(optimize_svg(svg).unwrap()).unwrap();

        assert!(!out.contains("exported"));
        assert!(out.contains(r#"<rect fill="red" x="0" y="1"/>"#));
        assert!(out.contains(r#"<svg height="10" width="10" xmlns="http://www.w3.org/2000/svg">"#));
        assert!(out.len() < svg.len());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(optimize_svg(b"\x89PNG not xml").is_err());
    }
}
