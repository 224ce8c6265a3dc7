//! Default transformer: rewrites ES module import specifiers in place.
//!
//! Scans script sources line by line for static imports, re-exports and
//! string-literal dynamic imports, resolves each distinct specifier once
//! through the pipeline's resolver, and splices the served URLs back in.
//! Other categories pass through with their content type. Syntax lowering
//! (TypeScript, JSX) is left to richer transformers.

use super::{
    ContentCategory, SpecifierResolver, TransformError, TransformOutput, TransformRequest,
    Transformer,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// A specifier literal located in source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecifierSpan {
    /// Byte offset of the first character inside the quotes.
    pub start: usize,
    /// Byte offset one past the last character inside the quotes.
    pub end: usize,
    pub specifier: String,
}

/// Line-oriented ES import rewriter.
#[derive(Debug, Default, Clone, Copy)]
pub struct EsmTransformer;

impl EsmTransformer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transformer for EsmTransformer {
    async fn transform(
        &self,
        request: TransformRequest<'_>,
        resolver: &dyn SpecifierResolver,
    ) -> Result<TransformOutput, TransformError> {
        let content_type = content_type_for(request.category);

        if request.category != ContentCategory::Script {
            return Ok(TransformOutput {
                content: request.source.to_vec(),
                content_type: content_type.to_string(),
                dependency_files: Vec::new(),
            });
        }

        let code = std::str::from_utf8(request.source).map_err(|e| {
            TransformError::Diagnostic(format!("source is not valid UTF-8: {e}"))
        })?;

        let spans = find_specifiers(code);
        let mut resolved: HashMap<&str, String> = HashMap::new();
        for span in &spans {
            if resolved.contains_key(span.specifier.as_str()) {
                continue;
            }
            let url = resolver.resolve(request.filename, &span.specifier).await?;
            resolved.insert(&span.specifier, url);
        }

        let mut out = String::with_capacity(code.len());
        let mut cursor = 0;
        for span in &spans {
            out.push_str(&code[cursor..span.start]);
            out.push_str(&resolved[span.specifier.as_str()]);
            cursor = span.end;
        }
        out.push_str(&code[cursor..]);

        Ok(TransformOutput {
            content: out.into_bytes(),
            content_type: content_type.to_string(),
            dependency_files: Vec::new(),
        })
    }
}

fn content_type_for(category: ContentCategory) -> &'static str {
    match category {
        ContentCategory::Script => "application/javascript; charset=utf-8",
        ContentCategory::Style => "text/css; charset=utf-8",
        ContentCategory::Markup => "text/html; charset=utf-8",
        ContentCategory::Json => "application/json",
        ContentCategory::Asset => "application/octet-stream",
    }
}

/// Locate every import specifier literal in `code`, in source order.
#[must_use]
pub fn find_specifiers(code: &str) -> Vec<SpecifierSpan> {
    let mut spans = Vec::new();
    let mut offset = 0;

    for line in code.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if !is_comment(trimmed) {
            if let Some((start, end)) = static_specifier(trimmed) {
                push_span(&mut spans, line, offset, indent + start, indent + end);
            }

            let mut search = 0;
            while let Some(idx) = line[search..].find("import(") {
                let after = search + idx + "import(".len();
                if let Some((start, end)) = quoted_at(line, after) {
                    push_span(&mut spans, line, offset, start, end);
                    search = end;
                } else {
                    search = after;
                }
            }
        }

        offset += line.len();
    }

    // Static and dynamic matches on one line are found in separate passes.
    spans.sort_by_key(|span| span.start);
    let mut last_end = 0;
    spans.retain(|span| {
        let keep = span.start >= last_end;
        if keep {
            last_end = span.end;
        }
        keep
    });
    spans
}

fn push_span(spans: &mut Vec<SpecifierSpan>, line: &str, offset: usize, start: usize, end: usize) {
    spans.push(SpecifierSpan {
        start: offset + start,
        end: offset + end,
        specifier: line[start..end].to_string(),
    });
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*')
}

/// Specifier range of `import x from '...'`, `export ... from '...'`,
/// `... } from '...'` (end of a multi-line clause) or `import '...'`.
fn static_specifier(trimmed: &str) -> Option<(usize, usize)> {
    let starts_clause = trimmed.starts_with("import ")
        || trimmed.starts_with("import{")
        || trimmed.starts_with("export ")
        || trimmed.starts_with("export{")
        || trimmed.contains("} from")
        || trimmed.contains("}from");
    if !starts_clause {
        return None;
    }

    if let Some(idx) = trimmed.find(" from") {
        if let Some(range) = quoted_at(trimmed, idx + " from".len()) {
            return Some(range);
        }
    }
    if let Some(idx) = trimmed.find("}from") {
        if let Some(range) = quoted_at(trimmed, idx + "}from".len()) {
            return Some(range);
        }
    }
    if trimmed.starts_with("import ") {
        return quoted_at(trimmed, "import ".len());
    }
    None
}

/// Range of the string literal starting at `from` after optional whitespace.
fn quoted_at(s: &str, from: usize) -> Option<(usize, usize)> {
    let rest = s.get(from..)?;
    let skipped = rest.len() - rest.trim_start().len();
    let start_quote = from + skipped;
    let quote = s[start_quote..].chars().next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let inner_start = start_quote + 1;
    let len = s[inner_start..].find(quote)?;
    Some((inner_start, inner_start + len))
}
