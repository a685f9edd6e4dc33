//! Instruction templates for the answer step.

use scrapegraph_shared::{Document, SourceType};

/// How each source type is described to the model.
fn describe(source_type: SourceType) -> &'static str {
    match source_type {
        SourceType::Json => "JSON documents",
        SourceType::Csv => "CSV tables, converted to one JSON object per row",
        SourceType::Xml => "XML documents",
        SourceType::Markdown => "Markdown documents",
    }
}

/// System instructions for answering a question over `source_type` content.
pub fn instructions(
    source_type: SourceType,
    additional_info: Option<&str>,
    structured: bool,
) -> String {
    let mut out = format!(
        "You are a data extraction assistant. The content below was taken from {}.\n\
         Answer the question using only that content. If the content does not \
         contain the answer, say that it is not available. Do not invent values.",
        describe(source_type)
    );

    if structured {
        out.push_str("\nReply with a single JSON value matching the requested schema and nothing else.");
    }

    if let Some(info) = additional_info.map(str::trim).filter(|s| !s.is_empty()) {
        out.push_str("\n\n");
        out.push_str(info);
    }

    out
}

/// Render fetched documents as one context block, each headed by its path.
pub fn render_documents(documents: &[Document]) -> String {
    match documents {
        [single] => single.content.clone(),
        many => many
            .iter()
            .map(|d| format!("--- {} ---\n{}", d.source, d.content))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

/// Render retrieved chunks as one context block.
pub fn render_chunks(chunks: &[String]) -> String {
    chunks.join("\n\n")
}
