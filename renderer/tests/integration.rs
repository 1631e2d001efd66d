use std::collections::HashMap;

use emboss::ErrorKind;
use pretty_assertions::assert_eq;
use renderer::{Config, Emboss, Value};
use rstest::rstest;
use serde_json::json;

fn render(source: &str, data: serde_json::Value) -> String {
    let emboss = Emboss::new();
    let data = Value::from(data);
    emboss.render(source, Some(&data)).expect("render failed")
}

fn render_err(emboss: &Emboss, source: &str, data: serde_json::Value) -> emboss::TemplateError {
    let data = Value::from(data);
    emboss.render(source, Some(&data)).unwrap_err()
}

fn with_sources(strict: bool, sources: &[(&str, &str)]) -> Emboss {
    let files: HashMap<String, String> = sources
        .iter()
        .map(|(id, text)| (id.to_string(), text.to_string()))
        .collect();
    let mut config = Config::default();
    config.strict_scoping = strict;
    Emboss::with_config(config).with_resolver(files)
}

#[rstest]
#[case("")]
#[case("plain text")]
#[case("<ul><li>one</li>  <li>two</li></ul>")]
#[case("a } b { c }{ d")]
fn text_without_directives_passes_through(#[case] source: &str) {
    assert_eq!(render(source, json!({})), source);
    assert_eq!(render(source, json!({"x": 1, "items": [1, 2]})), source);
}

#[test]
fn line_breaks_are_normalized_away() {
    assert_eq!(render("<p>\n  Hi\n</p>", json!({})), "<p>  Hi</p>");
}

#[test]
fn print_evaluates_expressions() {
    assert_eq!(render("{{print 1+1}}", json!({})), "2");
    assert_eq!(render("{{ print name + '!' }}", json!({"name": "Ada"})), "Ada!");
    assert_eq!(render("{{print user.tags[1]}}", json!({"user": {"tags": ["a", "b"]}})), "b");
    assert_eq!(render("{{print 7 / 2}}", json!({})), "3.5");
}

#[test]
fn unknown_directives_are_text() {
    assert_eq!(render("{{name}} {{/x}}", json!({})), "{{name}} {{/x}}");
}

#[rstest]
#[case(json!({"n": 1}), "one")]
#[case(json!({"n": 2}), "two")]
#[case(json!({"n": 3}), "many")]
fn conditional_chains(#[case] data: serde_json::Value, #[case] expected: &str) {
    let sibling = "{{if n == 1}}one{{/if}}{{elseif n == 2}}two{{/elseif}}{{else}}many{{/else}}";
    let inline = "{{if n == 1}}one{{elseif n == 2}}two{{else}}many{{/if}}";
    assert_eq!(render(sibling, data.clone()), expected);
    assert_eq!(render(inline, data), expected);
}

#[test]
fn inline_else_renders_the_alternative() {
    assert_eq!(render("{{if false}}A{{else}}B{{/if}}", json!({})), "B");
    assert_eq!(render("{{if true}}A{{else}}B{{/if}}", json!({})), "A");
}

#[test]
fn closing_the_outer_if_ends_its_trailing_else() {
    let source = "{{if a}}{{if b}}x{{/if}}{{else}}y{{/if}}";
    assert_eq!(render(source, json!({"a": false, "b": true})), "y");
    assert_eq!(render(source, json!({"a": true, "b": true})), "x");
    assert_eq!(render(source, json!({"a": true, "b": false})), "");
}

#[test]
fn second_else_in_a_chain_fails() {
    let err = render_err(&Emboss::new(), "{{if a}}1{{else}}2{{else}}3{{/if}}", json!({"a": true}));
    assert_eq!(err.kind, ErrorKind::Generation);
    assert!(err.message.contains("cannot follow \"else\""), "{}", err.message);
}

#[test]
fn else_without_if_fails() {
    let err = render_err(&Emboss::new(), "x{{else}}y{{/else}}", json!({}));
    assert_eq!(err.kind, ErrorKind::Structural);
}

#[test]
fn each_binds_item_and_count() {
    let source = "{{each x in items count i}}{{print i}}:{{print x}}{{/each}}";
    assert_eq!(render(source, json!({"items": ["a", "b"]})), "0:a1:b");
}

#[test]
fn each_binds_keys_of_objects() {
    let source = "{{each v in scores key name count i}}{{print i}}.{{print name}}={{print v}};{{/each}}";
    assert_eq!(
        render(source, json!({"scores": {"zed": 3, "amy": 5}})),
        "0.zed=3;1.amy=5;"
    );
}

#[test]
fn each_modifiers_are_token_aware() {
    let source = "{{each c in counts key k}}{{print k}}{{print c}}{{/each}}";
    assert_eq!(render(source, json!({"counts": [4, 5]})), "0415");
}

#[test]
fn nested_each_loops_keep_separate_counters() {
    let source = "{{each row in rows count r}}{{each cell in row count c}}{{print r}}{{print c}}{{print cell}} {{/each}}{{/each}}";
    assert_eq!(
        render(source, json!({"rows": [["a", "b"], ["c"]]})),
        "00a 01b 10c "
    );
}

#[test]
fn for_loops_run_host_clauses() {
    assert_eq!(render("{{for let i = 0; i < 3; i++}}{{print i}}{{/for}}", json!({})), "012");
    assert_eq!(render("{{for k in obj}}{{print k}}{{/for}}", json!({"obj": {"a": 1, "b": 2}})), "ab");
    assert_eq!(render("{{for v of list}}[{{print v}}]{{/for}}", json!({"list": [1, 2]})), "[1][2]");
}

#[test]
fn execute_runs_statements_without_output() {
    let source = "{{execute let total = 0}}{{each n in nums}}{{execute total += n}}{{/each}}{{print total}}";
    assert_eq!(render(source, json!({"nums": [1, 2, 3]})), "6");
}

#[test]
fn ignore_drops_and_neglect_preserves() {
    assert_eq!(render("{{ignore}}{{print x}}{{/ignore}}", json!({})), "");
    assert_eq!(render("{{ignore}}{{print x}}{{/ignore}}", json!({"x": 1})), "");
    assert_eq!(render("{{neglect}}{{print x}}{{/neglect}}", json!({})), "{{print x}}");
    assert_eq!(
        render("{{neglect}}{{if a}}{{/if}}{{/neglect}}", json!({})),
        "{{if a}}{{/if}}"
    );
}

#[rstest]
#[case("{{if a}}x{{/each}}")]
#[case("{{if a}}{{each x in y}}{{/if}}{{/each}}")]
#[case("{{each x in y}}{{if a}}{{for k in o}}{{/if}}{{/for}}{{/if}}{{/each}}")]
#[case("{{neglect}}{{ignore}}{{/neglect}}{{/ignore}}")]
fn mismatched_closers_are_structural(#[case] source: &str) {
    let err = Emboss::new().compile(source, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Structural, "{}", err);
}

#[test]
fn import_context_is_local_under_strict_scoping() {
    let emboss = with_sources(true, &[("child", "{{print a}}")]);
    let data = Value::from(json!({"a": 0}));
    let out = emboss
        .render("{{import 'child' context {a: 1}}}|{{print a}}", Some(&data))
        .unwrap();
    assert_eq!(out, "1|0");

    let err = render_err(&emboss, "{{import 'child' context {a: 1}}}{{print a}}", json!({}));
    assert_eq!(err.kind, ErrorKind::Render);
}

#[test]
fn import_context_leaks_without_strict_scoping() {
    let emboss = with_sources(false, &[("child", "{{print a}}")]);
    let data = Value::from(json!({"a": 0}));
    let out = emboss
        .render("{{import 'child' context {a: 1}}}|{{print a}}", Some(&data))
        .unwrap();
    assert_eq!(out, "1|1");
}

#[test]
fn loop_bindings_leak_only_without_strict_scoping() {
    let source = "{{each x in items}}{{/each}}{{print x}}";
    let data = json!({"items": [1, 2]});
    let loose = with_sources(false, &[]);
    let loose_data = Value::from(data.clone());
    assert_eq!(loose.render(source, Some(&loose_data)).unwrap(), "2");
    let err = render_err(&with_sources(true, &[]), source, data);
    assert_eq!(err.kind, ErrorKind::Render);
}

#[test]
fn imports_without_context_share_the_scope() {
    let emboss = with_sources(true, &[("row", "<td>{{print cell}}</td>")]);
    let data = Value::from(json!({"cells": ["a", "b"]}));
    let out = emboss
        .render("{{each cell in cells}}{{import 'row'}}{{/each}}", Some(&data))
        .unwrap();
    assert_eq!(out, "<td>a</td><td>b</td>");
}

#[test]
fn import_failures() {
    let emboss = with_sources(true, &[("a", "{{import 'b'}}"), ("b", "{{import 'a'}}")]);
    let err = render_err(&emboss, "{{import 'missing'}}", json!({}));
    assert_eq!(err.kind, ErrorKind::Resolution);
    let err = render_err(&emboss, "{{import 'a'}}", json!({}));
    assert_eq!(err.kind, ErrorKind::Structural);
    assert!(err.message.contains("Recursive import"), "{}", err.message);
    let err = render_err(&emboss, "{{import 'a' context}}", json!({}));
    assert_eq!(err.kind, ErrorKind::Structural);
}

#[test]
fn compiling_twice_is_deterministic() {
    let emboss = Emboss::new();
    let source = "{{each x in xs count i}}{{if i > 0}},{{/if}}{{print upper(x)}}{{/each}}";
    let first = emboss.compile(source, Some("list")).unwrap();
    let second = emboss.compile(source, Some("list")).unwrap();
    let data = Value::from(json!({"xs": ["a", "b", "c"]}));
    let a = first.render(Some(&data)).unwrap();
    let b = second.render(Some(&data)).unwrap();
    assert_eq!(a, "A,B,C");
    assert_eq!(a, b);
    assert_eq!(first.render(Some(&data)).unwrap(), a);
}

#[test]
fn reserved_data_key_is_a_source_error() {
    let emboss = Emboss::new();
    let compiled = emboss.compile("static", None).unwrap();
    let data = Value::from(json!({ "EmbossInternalData": 1 }));
    let err = compiled.render(Some(&data)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Source);

    let err = render_err(&emboss, "{{execute let EmbossInternalData = 1}}", json!({}));
    assert_eq!(err.kind, ErrorKind::Source);
}

#[test]
fn reserved_import_context_key_is_a_source_error() {
    let emboss = with_sources(true, &[("c", "{{print 1}}")]);
    let err = render_err(&emboss, "{{import 'c' context {EmbossInternalData: 1}}}", json!({}));
    assert_eq!(err.kind, ErrorKind::Source);
    assert!(err.message.contains("EmbossInternalData"), "{}", err.message);

    let emboss = with_sources(false, &[("c", "{{print n}}")]);
    let err = render_err(&emboss, "{{import 'c' context {n: 1, EmbossInternalData: 2}}}", json!({}));
    assert_eq!(err.kind, ErrorKind::Source);
}

#[test]
fn deep_nesting_fails_instead_of_overflowing() {
    let blocks = format!("{}x{}", "{{if true}}".repeat(10_000), "{{/if}}".repeat(10_000));
    let err = Emboss::new().compile(&blocks, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Structural);
    assert!(err.message.contains("Nesting depth"), "{}", err.message);

    let parens = format!("{{{{print {}1{}}}}}", "(".repeat(10_000), ")".repeat(10_000));
    let err = Emboss::new().compile(&parens, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Generation);

    let mut config = Config::default();
    config.max_nesting_depth = 2;
    let emboss = Emboss::with_config(config);
    assert!(emboss.compile("{{if a}}{{if b}}x{{/if}}{{/if}}", None).is_ok());
    let err = emboss.compile("{{if a}}{{if b}}{{if c}}x{{/if}}{{/if}}{{/if}}", None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Structural);

    let shallow = format!("{}x{}", "{{if true}}".repeat(60), "{{/if}}".repeat(60));
    assert_eq!(render(&shallow, json!({})), "x");
}

#[test]
fn render_errors_name_the_template_and_block() {
    let emboss = Emboss::new();
    let compiled = emboss.compile("<b>{{print user.name}}</b>", Some("card")).unwrap();
    let err = compiled.render(Some(&Value::from(json!({})))).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Render);
    assert_eq!(err.template_id.as_deref(), Some("card"));
    let text = err.to_string();
    assert!(text.contains("card"), "{}", text);
    assert!(text.contains("print user.name"), "{}", text);
}

#[test]
fn unknown_functions_fail_at_compile_time() {
    let err = Emboss::new().compile("{{print shout(x)}}", None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Generation);
}

#[test]
fn stored_templates_render_by_id() {
    let emboss = Emboss::new();
    let first = emboss.compile("v1", Some("page")).unwrap();
    let second = emboss.compile("v2 {{print n}}", Some("page")).unwrap();
    assert!(!emboss.store("page", first));
    assert!(emboss.store("page", second));
    let data = Value::from(json!({"n": 2}));
    assert_eq!(emboss.render_stored("page", Some(&data)).unwrap(), "v2 2");
    assert_eq!(emboss.registry().ids(), vec!["page".to_string()]);
}

#[test]
fn data_from_toml_renders_like_json() {
    let table: toml::Value = toml::from_str("title = 'Hi'\ncount = 3").unwrap();
    let compiled = Emboss::new().compile("{{print title}} x{{print count}}", None).unwrap();
    assert_eq!(compiled.render(Some(&Value::from(table))).unwrap(), "Hi x3");
}
