use anyhow::Result;
use swc_common::{
    comments::SingleThreadedComments, errors::Handler, sync::Lrc, FileName, SourceMap,
};
use swc_ecma_ast::EsVersion;
use swc_ecma_parser::{EsSyntax, Syntax, TsSyntax};

/// Result of parsing a source file.
pub struct ParseResult {
    pub module: swc_ecma_ast::Module,
    pub comments: SingleThreadedComments,
    pub source_map: Lrc<SourceMap>,
}

/// Pick the parser syntax from the file extension.
///
/// `.ts`/`.mts`/`.cts` and `.tsx` parse as TypeScript, everything else as
/// ECMAScript (with JSX for `.jsx`).
pub fn syntax_for(filename: &str) -> Syntax {
    let is_tsx = filename.ends_with(".tsx");
    let is_ts = is_tsx
        || filename.ends_with(".ts")
        || filename.ends_with(".mts")
        || filename.ends_with(".cts");
    if is_ts {
        Syntax::Typescript(TsSyntax {
            tsx: is_tsx,
            decorators: true,
            ..Default::default()
        })
    } else {
        Syntax::Es(EsSyntax {
            jsx: filename.ends_with(".jsx"),
            ..Default::default()
        })
    }
}

/// Parse a source string into a module.
///
/// Syntax errors are rendered to stderr through SWC's diagnostic emitter and
/// returned as an error naming the file.
pub fn parse_source(source: &str, filename: &str) -> Result<ParseResult> {
    let source_map: Lrc<SourceMap> = Default::default();
    let source_file = source_map.new_source_file(
        Lrc::new(FileName::Custom(filename.to_string())),
        source.to_string(),
    );

    let comments = SingleThreadedComments::default();

    let handler =
        Handler::with_emitter_writer(Box::new(std::io::stderr()), Some(source_map.clone()));

    let mut recovered = vec![];
    let module = swc_ecma_parser::parse_file_as_module(
        &source_file,
        syntax_for(filename),
        EsVersion::latest(),
        Some(&comments),
        &mut recovered,
    )
    .map_err(|e| {
        e.into_diagnostic(&handler).emit();
        anyhow::anyhow!("failed to parse {filename}")
    })?;

    if let Some(first) = recovered.into_iter().next() {
        first.into_diagnostic(&handler).emit();
        anyhow::bail!("failed to parse {filename}");
    }

    Ok(ParseResult {
        module,
        comments,
        source_map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_async_function() {
        let parsed = parse_source("async function f() { await g(); }", "f.js").unwrap();
        assert_eq!(parsed.module.body.len(), 1);
    }

    #[test]
    fn reports_syntax_errors() {
        assert!(parse_source("async function f( {", "broken.js").is_err());
    }

    #[test]
    fn typescript_by_extension() {
        assert!(matches!(syntax_for("a.ts"), Syntax::Typescript(_)));
        assert!(matches!(syntax_for("a.tsx"), Syntax::Typescript(TsSyntax { tsx: true, .. })));
        assert!(matches!(syntax_for("a.js"), Syntax::Es(_)));
        let parsed = parse_source("async function f(x: number): Promise<void> {}", "f.ts");
        assert!(parsed.is_ok());
    }
}
