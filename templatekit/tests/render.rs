use indoc::indoc;
use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme};
use templatekit::{TemplateKitError, TemplateRenderer, TemplateSource, Value};
use templatekit_testhelpers::IPanic;

fn data(json: serde_json::Value) -> Value {
    templatekit::to_value(&json).unwrap()
}

async fn render(template: &str, input: Value) -> Result<String, IPanic> {
    Ok(TemplateRenderer::kit()
        .render_bytes(template.to_owned(), input, "test.kit")
        .await?)
}

async fn render_err(template: &str, input: Value) -> TemplateKitError {
    TemplateRenderer::kit()
        .render_bytes(template.to_owned(), input, "test.kit")
        .await
        .unwrap_err()
}

#[tokio::test]
async fn prints_escaped_and_raw() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let input = data(serde_json::json!({ "name": "<b>Tom & Jerry</b>" }));
    assert_eq!(
        render("Hi #(name)!", input.clone()).await?,
        "Hi &lt;b&gt;Tom &amp; Jerry&lt;/b&gt;!"
    );
    assert_eq!(
        render("Hi #get(name)!", input).await?,
        "Hi <b>Tom & Jerry</b>!"
    );
    Ok(())
}

#[tokio::test]
async fn text_without_tags_is_untouched() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    assert_eq!(
        render("Issue #42 { braces } stay", Value::Null).await?,
        "Issue #42 { braces } stay"
    );
    assert_eq!(render(r"\#(name) is literal", Value::Null).await?, "#(name) is literal");
    assert_eq!(render("", Value::Null).await?, "");
    Ok(())
}

#[tokio::test]
async fn missing_values_print_nothing() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    assert_eq!(render("[#(nobody.home)]", Value::Null).await?, "[]");
    Ok(())
}

#[tokio::test]
async fn interpolated_strings() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let input = data(serde_json::json!({ "name": "Ada" }));
    assert_eq!(
        render(r#"#uppercase("hi #(name)")"#, input).await?,
        "HI ADA"
    );
    Ok(())
}

#[tokio::test]
async fn conditionals_pick_the_first_truthy_branch() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let template = "#if(n == 1) {one} else if(n > 1) {many} else {none}";
    for (n, expected) in [(1, "one"), (5, "many"), (0, "none")] {
        let input = data(serde_json::json!({ "n": n }));
        assert_eq!(render(template, input).await?, expected);
    }
    assert_eq!(render("#if(missing) {shown}", Value::Null).await?, "");
    Ok(())
}

#[tokio::test]
async fn expressions() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let input = data(serde_json::json!({ "count": 3, "hidden": false, "price": 2.5 }));
    assert_eq!(render("#(1 + 2 * 3)", input.clone()).await?, "7");
    assert_eq!(render("#((1 + 2) * 3)", input.clone()).await?, "9");
    assert_eq!(render("#(count * price)", input.clone()).await?, "7.5");
    assert_eq!(render("#(count % 2 == 1)", input.clone()).await?, "true");
    assert_eq!(render("#(-4 + count)", input.clone()).await?, "-1");
    assert_eq!(
        render("#if(count > 1 && !hidden) {visible}", input.clone()).await?,
        "visible"
    );
    assert_eq!(render("#(1 / 0)", input).await?, "");
    Ok(())
}

#[tokio::test]
async fn loops_bind_item_and_position() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let input = data(serde_json::json!({ "langs": ["Rust", "Swift", "Go"] }));
    let template = indoc! {"
        #for(lang in langs) {#if(isFirst) {[}#(index):#(lang)#if(isLast) {]} else {, }}
    "};
    let output = render(template, input).await?;
    insta::assert_snapshot!(output.trim_end(), @"[0:Rust, 1:Swift, 2:Go]");
    Ok(())
}

#[tokio::test]
async fn loops_over_nothing() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let input = data(serde_json::json!({ "empty": [] }));
    assert_eq!(render("a#for(x in empty) {#(x)}b", input).await?, "ab");
    assert_eq!(render("a#for(x in missing) {#(x)}b", Value::Null).await?, "ab");
    Ok(())
}

#[tokio::test]
async fn loops_reject_scalars() {
    templatekit_testhelpers::setup();
    let input = data(serde_json::json!({ "name": "Ada" }));
    let err = render_err("#for(c in name) {#(c)}", input).await;
    assert!(matches!(err, TemplateKitError::Serialize { .. }), "{err:?}");
    assert!(
        err.to_string().contains("Could not convert iterator data to array"),
        "{err}"
    );
}

#[tokio::test]
async fn set_is_visible_to_later_siblings_only() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    assert_eq!(
        render(r#"[#(greeting)]#set("greeting", "hi")[#(greeting)]"#, Value::Null).await?,
        "[][hi]"
    );
    assert_eq!(
        render(r#"#var("user.name") {Ada #uppercase("l")}#(user.name)"#, Value::Null).await?,
        "Ada L"
    );
    Ok(())
}

#[tokio::test]
async fn writes_inside_bodies_stay_inside() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let input = data(serde_json::json!({ "items": [1, 2], "last": "none" }));
    let template = r#"#for(i in items) {#set("last", i)}#(last)#if(true) {#set("last", "x")}#(last)"#;
    assert_eq!(render(template, input).await?, "nonenone");
    Ok(())
}

#[tokio::test]
async fn unknown_tags_are_reported() {
    templatekit_testhelpers::setup();
    let err = render_err("ok #shout(name)", Value::Null).await;
    let TemplateKitError::MissingTag { name, location } = &err else {
        panic!("expected a missing tag error, got {err:?}");
    };
    assert_eq!(name, "shout");
    assert_eq!(location.range, 3..15);
}

fn report(err: &TemplateKitError) -> String {
    let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor());
    let mut out = String::new();
    handler.render_report(&mut out, err).unwrap();
    out
}

#[tokio::test]
async fn diagnostics_quote_the_template() {
    templatekit_testhelpers::setup();
    let err = render_err("Hello, #(name)!\n#nope(1)\nbye", Value::Null).await;
    insta::assert_snapshot!(report(&err), @r"
    templatekit::missing_tag

      × No tag named `nope` is registered (test.kit line: 1 column: 0 range: 16..24)
       ╭─[test.kit:2:1]
     1 │ Hello, #(name)!
     2 │ #nope(1)
       · ────┬───
       ·     ╰── unknown tag
     3 │ bye
       ╰────
      help: Register a handler for `nope` in the renderer's tag registry
    ");

    let err = render_err("#if(x) {open", Value::Null).await;
    let label = err.labels().unwrap().next().unwrap();
    assert_eq!(label.label(), Some("here"));
    assert!(err.source_code().is_some());

    let detached = TemplateKitError::parse("no text", TemplateSource::detached("memory"));
    assert!(detached.labels().is_none());
    assert!(detached.source_code().is_none());
}

#[tokio::test]
async fn parse_errors_carry_a_location() {
    templatekit_testhelpers::setup();
    let err = render_err("line one\n#if(x) {never closed", Value::Null).await;
    let TemplateKitError::Parse { reason, location } = &err else {
        panic!("expected a parse error, got {err:?}");
    };
    assert_eq!(reason, "Expected `}` to close body");
    assert_eq!(location.line, 1);
    assert_eq!(&*location.file, "test.kit");
}

#[tokio::test]
async fn values_without_text_print_as_empty() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let input = data(serde_json::json!({ "user": { "name": "Ada" }, "tags": ["a"] }));
    assert_eq!(render("[#get(user)][#(tags)]", input).await?, "[][]");
    Ok(())
}
