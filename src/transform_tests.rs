//! End-to-end scenarios for the per-file transform stream.

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::compile::TemplateCompiler;
    use crate::config::{ConfigContext, MinifySetting, TransformOptions};
    use crate::error::{CompileError, TransformError};
    use crate::tokenize::{Tokenizer, TwigTokenizer};
    use crate::transform::{transform_file, Twigify};

    fn isolated(options: TransformOptions) -> Twigify {
        Twigify::with_context(ConfigContext::new(), options, TemplateCompiler::default())
    }

    fn unminified() -> TransformOptions {
        TransformOptions::new().with_minify(MinifySetting::Disabled)
    }

    fn compile_one(twigify: &Twigify, file: &str, source: &str) -> String {
        let chunks = twigify.transform(file).run([source]).unwrap();
        assert_eq!(chunks.len(), 1);
        String::from_utf8(chunks[0].clone()).unwrap()
    }

    /// The serialized token tree embedded in a module.
    fn embedded_tree(module: &str) -> Value {
        let start = module.find("data:").unwrap() + "data:".len();
        let end = module.rfind(", precompiled: true").unwrap();
        serde_json::from_str(&module[start..end]).unwrap()
    }

    /// Raw text of a serialized tree, block bodies included.
    fn raw_text(tree: &Value) -> String {
        let mut text = String::new();
        for token in tree.as_array().into_iter().flatten() {
            match token["type"].as_str() {
                Some("raw") => text.push_str(token["value"].as_str().unwrap_or_default()),
                Some("logic") => text.push_str(&raw_text(&token["token"]["output"])),
                _ => {}
            }
        }
        text
    }

    #[test]
    fn test_module_embeds_literal_identifier() {
        let twigify = isolated(unminified());
        let module = compile_one(&twigify, "/srv/views/user/card.twig", "<b>{{ user }}</b>");
        assert!(module.starts_with("\nmodule.exports = Twig.twig({ id: "));
        assert!(module.contains("\"/srv/views/user/card.twig\""));
        assert!(module.ends_with(";"));
    }

    #[test]
    fn test_module_tree_matches_tokenizer() {
        let twigify = isolated(unminified());
        let source = "{% for x in xs %}<i>{{ x }}</i>{% endfor %}";
        let module = compile_one(&twigify, "/a.twig", source);
        let expected = TwigTokenizer.tokenize("/a.twig", source).unwrap();
        assert_eq!(embedded_tree(&module), serde_json::to_value(&expected).unwrap());
    }

    #[test]
    fn test_relative_path_defers_identifier() {
        let twigify = isolated(unminified().with_relative_path(true));
        let module = compile_one(&twigify, "/srv/views/a.twig", "x");
        assert!(module.contains("Twig.twig({ id: __filename, path: __dirname, data:"));
        assert!(!module.contains("/srv/views"));
    }

    #[test]
    fn test_replace_paths_first_declared_wins() {
        let options = TransformOptions::from_value(&json!({
            "minify": false,
            "replacePaths": { "/app": "@app", "/ap": "@X" }
        }));
        let twigify = isolated(options);
        let module = compile_one(&twigify, "/app/foo.twig", "x");
        assert!(module.contains("id: \"@app/foo.twig\""));
    }

    #[test]
    fn test_chunking_does_not_change_output() {
        let twigify = isolated(unminified());
        let source = "Hi {{ name|upper }}, {% if admin %}welcome back{% endif %}";
        let whole = compile_one(&twigify, "/a.twig", source);

        let bytes = source.as_bytes();
        let pieces: Vec<&[u8]> = bytes.chunks(3).collect();
        let chunked = twigify.transform("/a.twig").run(pieces).unwrap();
        assert_eq!(chunked, vec![whole.into_bytes()]);
    }

    #[test]
    fn test_ineligible_file_is_byte_identical() {
        let twigify = isolated(TransformOptions::new());
        let input: Vec<&[u8]> = vec![&b".a { color: red }"[..], &b"\n"[..], &b"{{ not a template"[..]];
        let output = twigify.transform("styles.css").run(input.clone()).unwrap();
        assert_eq!(output, input.iter().map(|c| c.to_vec()).collect::<Vec<_>>());
    }

    #[test]
    fn test_custom_extensions_select_files() {
        let twigify = isolated(unminified().with_extensions([".TPL"]));
        assert!(twigify.transform("page.tpl").run(["x"]).unwrap()[0].starts_with(b"\nmodule"));
        let passed = twigify.transform("page.twig").run(["x"]).unwrap();
        assert_eq!(passed, vec![b"x".to_vec()]);
    }

    #[test]
    fn test_unterminated_tag_emits_nothing() {
        let twigify = isolated(unminified());
        let mut stream = twigify.transform("/broken.twig");
        assert_eq!(stream.write(b"<p>{% if user ").unwrap(), None);
        assert_eq!(stream.write(b"</p>").unwrap(), None);
        let err = stream.finish().unwrap_err();
        match err {
            TransformError::Compile(CompileError::Tokenize { file, .. }) => {
                assert_eq!(file, "/broken.twig")
            }
            other => panic!("expected tokenize error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_markup_fails_when_minifying() {
        let twigify = isolated(TransformOptions::new());
        let err = twigify
            .transform("/broken.html")
            .run(["<div><!-- never closed"])
            .unwrap_err();
        assert!(matches!(
            err,
            TransformError::Compile(CompileError::Minify { .. })
        ));

        let lenient = isolated(unminified());
        assert!(lenient
            .transform("/broken.html")
            .run(["<div><!-- never closed"])
            .is_ok());
    }

    #[test]
    fn test_minified_comment_absent_from_tree() {
        let source = "<div>\n  <!-- secret note -->\n  {{ title }}\n</div>";

        let plain = compile_one(&isolated(unminified()), "/a.html", source);
        assert!(raw_text(&embedded_tree(&plain)).contains("secret note"));

        let minified = compile_one(&isolated(TransformOptions::new()), "/a.html", source);
        let text = raw_text(&embedded_tree(&minified));
        assert!(!text.contains("secret note"));
        assert!(!minified.contains("secret note"));
        assert!(text.starts_with("<div>"));
        assert!(text.ends_with("</div>"));
        assert!(!text.contains('\n'));
    }

    #[test]
    fn test_abort_discards_buffer() {
        let twigify = isolated(unminified());
        let mut stream = twigify.transform("/a.twig");
        stream.write(b"{% if").unwrap();
        stream.abort();
    }

    #[test]
    fn test_last_written_options_apply_at_finish() {
        let context = ConfigContext::new();
        let literal = <Twigify>::with_context(context.clone(), unminified(), TemplateCompiler::default());
        let deferred = <Twigify>::with_context(
            context,
            TransformOptions::new().with_relative_path(true),
            TemplateCompiler::default(),
        );

        let mut first = literal.transform("/views/a.twig");
        first.write(b"a").unwrap();
        // A second file merges its options while the first is still buffering.
        let second = deferred.transform("/views/b.twig");

        let first_module = String::from_utf8(first.finish().unwrap().unwrap()).unwrap();
        assert!(first_module.contains("id: __filename"));
        assert!(second.run(["b"]).is_ok());
    }

    #[test]
    fn test_unspecified_options_are_inherited() {
        let context = ConfigContext::new();
        let aliasing = <Twigify>::with_context(
            context.clone(),
            unminified().with_replace_paths([("/views", "@views")]),
            TemplateCompiler::default(),
        );
        let bare = <Twigify>::with_context(context, TransformOptions::new(), TemplateCompiler::default());

        compile_one(&aliasing, "/srv/views/a.twig", "a");
        let module = compile_one(&bare, "/srv/views/b.twig", "<p>  b  </p>");
        assert!(module.contains("id: \"@views/b.twig\""));
        // Minification stayed disabled too.
        assert!(module.contains("<p>  b  </p>"));
    }

    #[test]
    fn test_single_file_entry_point_uses_global_context() {
        let stream = transform_file("notes.txt", TransformOptions::new());
        assert!(stream.is_pass_through());
        assert_eq!(stream.run(["plain"]).unwrap(), vec![b"plain".to_vec()]);
        assert!(Twigify::new(TransformOptions::new())
            .context()
            .is_same(&ConfigContext::global()));
    }
}
