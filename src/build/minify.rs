//! Local compressor attempt for JS and CSS content.
//!
//! Uses oxc for JavaScript and lightningcss for CSS. A return of `None`
//! means the attempt did not report success and the caller falls back to
//! the remote transform.

use crate::kind::AssetKind;

use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

/// Attempt local compression of `content`.
pub fn attempt(kind: AssetKind, content: &str) -> Option<String> {
    match kind {
        AssetKind::Js => minify_js(content),
        AssetKind::Css => minify_css(content),
    }
}

/// Minify JavaScript source code.
fn minify_js(source: &str) -> Option<String> {
    let allocator = Allocator::default();
    let source_type = SourceType::mjs();
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return None;
    }
    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);
    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code;
    Some(code)
}

/// Minify CSS source code.
fn minify_css(source: &str) -> Option<String> {
    let stylesheet = StyleSheet::parse(source, ParserOptions::default()).ok()?;
    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .ok()?;
    Some(result.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_attempt_succeeds() {
        let out = attempt(AssetKind::Css, "body {  color : red ; }").unwrap();
        assert!(out.contains("body"));
        assert!(out.len() < "body {  color : red ; }".len());
    }

    #[test]
    fn test_js_attempt_succeeds() {
        let out = attempt(AssetKind::Js, "function add(a, b) { return a + b; }").unwrap();
        assert!(!out.contains("\n\n"));
    }

    #[test]
    fn test_js_parse_failure_reports_no_success() {
        assert!(attempt(AssetKind::Js, "function {{{").is_none());
    }
}
