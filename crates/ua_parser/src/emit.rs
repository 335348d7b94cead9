use anyhow::{Context, Result};
use swc_common::{source_map::DefaultSourceMapGenConfig, sync::Lrc, SourceMap};
use swc_ecma_ast::{EsVersion, Module};
use swc_ecma_codegen::{text_writer::JsWriter, Emitter, Node};

/// Print a module back to source text.
pub fn emit_module(module: &Module, source_map: Lrc<SourceMap>) -> Result<String> {
    let mut buf = Vec::new();
    write_module(module, source_map, &mut buf, None)?;
    Ok(String::from_utf8(buf)?)
}

/// Print a module and build a source map for the spans that survived the
/// rewrite. Returns `(code, source_map_json)`.
pub fn emit_module_with_source_map(
    module: &Module,
    source_map: Lrc<SourceMap>,
) -> Result<(String, String)> {
    let mut buf = Vec::new();
    let mut srcmap_buf = vec![];
    write_module(module, source_map.clone(), &mut buf, Some(&mut srcmap_buf))?;

    let srcmap = source_map.build_source_map(&srcmap_buf, None, DefaultSourceMapGenConfig);
    let mut srcmap_json = vec![];
    srcmap
        .to_writer(&mut srcmap_json)
        .context("failed to serialize source map")?;

    Ok((String::from_utf8(buf)?, String::from_utf8(srcmap_json)?))
}

fn write_module(
    module: &Module,
    source_map: Lrc<SourceMap>,
    buf: &mut Vec<u8>,
    srcmap_buf: Option<&mut Vec<(swc_common::BytePos, swc_common::LineCol)>>,
) -> Result<()> {
    let writer = JsWriter::new(source_map.clone(), "\n", buf, srcmap_buf);
    let mut emitter = Emitter {
        cfg: swc_ecma_codegen::Config::default().with_target(EsVersion::latest()),
        cm: source_map,
        comments: None,
        wr: writer,
    };
    module.emit_with(&mut emitter)?;
    Ok(())
}
