// src/export.rs
//! Transcript export rendering
//!
//! Given a transcript and its ordered paragraphs, produce a rendering in one
//! of the supported formats. Selection is driven by the client's format
//! preference; anything else is rejected before any work happens.

use serde_json::json;

use crate::repository::{Paragraph, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Docx,
    Xmp,
}

impl ExportFormat {
    /// Parse a client-supplied format preference. Unsupported values return
    /// `None` so the caller can reject them as a client error.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "docx" => Some(ExportFormat::Docx),
            "xmp" => Some(ExportFormat::Xmp),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Xmp => "application/rdf+xml",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Docx => "docx",
            ExportFormat::Xmp => "xmp",
        }
    }
}

/// A finished rendering, ready to be written to the response.
#[derive(Debug)]
pub struct Rendering {
    pub content_type: &'static str,
    pub filename: String,
    pub body: String,
}

pub fn render(
    format: ExportFormat,
    id: &str,
    transcript: &Transcript,
    paragraphs: &[Paragraph],
) -> anyhow::Result<Rendering> {
    let body = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&json!({
            "transcript": transcript,
            "paragraphs": paragraphs,
        }))?,
        ExportFormat::Docx => render_docx(paragraphs),
        ExportFormat::Xmp => render_xmp(id, paragraphs),
    };
    Ok(Rendering {
        content_type: format.content_type(),
        filename: format!("transcript_{}.{}", id, format.file_extension()),
        body,
    })
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn render_docx(paragraphs: &[Paragraph]) -> String {
    let mut body = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\n\
         <w:body>\n",
    );
    for paragraph in paragraphs {
        body.push_str(&format!(
            "<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>\n",
            xml_escape(&paragraph.text)
        ));
    }
    body.push_str("</w:body>\n</w:document>\n");
    body
}

fn render_xmp(id: &str, paragraphs: &[Paragraph]) -> String {
    let mut body = String::from(
        "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n\
         <x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n\
         <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\"\n\
                  xmlns:xmpDM=\"http://ns.adobe.com/xmp/1.0/DynamicMedia/\">\n",
    );
    body.push_str(&format!(
        "<rdf:Description rdf:about=\"{}\">\n<xmpDM:markers>\n<rdf:Seq>\n",
        xml_escape(id)
    ));
    for paragraph in paragraphs {
        body.push_str(&format!(
            "<rdf:li xmpDM:startTime=\"{}\" xmpDM:name=\"{}\"/>\n",
            paragraph.start_time,
            xml_escape(&paragraph.text)
        ));
    }
    body.push_str("</rdf:Seq>\n</xmpDM:markers>\n</rdf:Description>\n</rdf:RDF>\n</x:xmpmeta>\n<?xpacket end=\"w\"?>\n");
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_paragraphs() -> Vec<Paragraph> {
        vec![
            Paragraph {
                id: Some("p1".into()),
                start_time: 0.0,
                text: "Hello <world> & friends".into(),
                confidence: Some(0.95),
                speaker_tag: Some(1),
            },
            Paragraph {
                id: Some("p2".into()),
                start_time: 3.5,
                text: "Second paragraph".into(),
                confidence: None,
                speaker_tag: None,
            },
        ]
    }

    #[test]
    fn parses_supported_formats_case_insensitively() {
        assert_eq!(ExportFormat::parse("JSON"), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::parse("docx"), Some(ExportFormat::Docx));
        assert_eq!(ExportFormat::parse("xmp"), Some(ExportFormat::Xmp));
        assert_eq!(ExportFormat::parse("pdf"), None);
    }

    #[test]
    fn json_rendering_contains_paragraphs() {
        let transcript = Transcript {
            id: Some("t1".into()),
            user_id: Some("u1".into()),
            ..Default::default()
        };
        let rendering = render(ExportFormat::Json, "t1", &transcript, &sample_paragraphs()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendering.body).unwrap();
        assert_eq!(value["paragraphs"].as_array().unwrap().len(), 2);
        assert_eq!(value["transcript"]["userId"], "u1");
    }

    #[test]
    fn markup_renderings_escape_text() {
        let transcript = Transcript::default();
        let docx = render(ExportFormat::Docx, "t1", &transcript, &sample_paragraphs()).unwrap();
        assert!(docx.body.contains("Hello &lt;world&gt; &amp; friends"));
        let xmp = render(ExportFormat::Xmp, "t1", &transcript, &sample_paragraphs()).unwrap();
        assert!(xmp.body.contains("xmpDM:startTime=\"3.5\""));
    }
}
