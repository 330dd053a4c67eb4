use templatekit::tags::DATE_FORMAT_CACHE_KEY;
use templatekit::{
    InMemoryLoader, TagContext, TagRegistry, TemplateKitError, TemplateRenderer, UserInfo, Value,
    default_tags,
};
use templatekit_testhelpers::IPanic;

fn data(json: serde_json::Value) -> Value {
    templatekit::to_value(&json).unwrap()
}

async fn render(template: &str, input: Value) -> Result<String, IPanic> {
    Ok(TemplateRenderer::kit()
        .render_bytes(template.to_owned(), input, "tags.kit")
        .await?)
}

async fn tag_error(template: &str) -> (String, String) {
    let err = TemplateRenderer::kit()
        .render_bytes(template.to_owned(), Value::Null, "tags.kit")
        .await
        .unwrap_err();
    match err {
        TemplateKitError::Tag { tag, reason, .. } => (tag, reason),
        other => panic!("expected a tag error, got {other:?}"),
    }
}

#[tokio::test]
async fn contains_looks_inside_arrays_only() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let input = data(serde_json::json!({ "langs": ["rust", "swift"], "word": "rustacean" }));
    assert_eq!(render(r#"#contains(langs, "rust")"#, input.clone()).await?, "true");
    assert_eq!(render(r#"#contains(langs, "go")"#, input.clone()).await?, "false");
    assert_eq!(render(r#"#contains(word, "rust")"#, input).await?, "false");
    Ok(())
}

#[tokio::test]
async fn case_changes() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let input = data(serde_json::json!({ "title": "hello wORLD of rust" }));
    assert_eq!(render("#lowercase(title)", input.clone()).await?, "hello world of rust");
    assert_eq!(render("#uppercase(title)", input.clone()).await?, "HELLO WORLD OF RUST");
    assert_eq!(render("#capitalize(title)", input).await?, "Hello World Of Rust");
    assert_eq!(render("#uppercase(42)", Value::Null).await?, "42");
    Ok(())
}

#[tokio::test]
async fn count_arrays_and_maps() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let input = data(serde_json::json!({
        "items": [1, 2, 3],
        "user": { "name": "Ada", "born": 1815 },
        "name": "Ada",
    }));
    assert_eq!(render("#count(items)", input.clone()).await?, "3");
    assert_eq!(render("#count(user)", input.clone()).await?, "2");
    assert_eq!(render("[#count(name)]", input.clone()).await?, "[]");
    assert_eq!(
        render("#if(count(items) > 2) {big}", input).await?,
        "big"
    );
    Ok(())
}

#[tokio::test]
async fn comments_render_nothing() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    assert_eq!(
        render("a#comment() {#nonexistent(tag)}b", Value::Null).await?,
        "ab"
    );
    Ok(())
}

#[tokio::test]
async fn dates() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let input = data(serde_json::json!({ "born": 86400 }));
    assert_eq!(
        render(r#"#date(born, "[year]-[month]-[day]")"#, input.clone()).await?,
        "1970-01-02"
    );
    assert_eq!(render("#date(born)", input).await?, "1970-01-02 00:00:00");
    Ok(())
}

#[tokio::test]
async fn date_formats_are_cached_per_render() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let loader = InMemoryLoader::new().with("when.kit", r#"#date(0, "[year]")/#date(0, "[year]")"#);
    let renderer = TemplateRenderer::builder(templatekit::KitParser)
        .loader(loader)
        .build();
    let user_info = UserInfo::new();
    let output = renderer
        .render_path("when.kit", Value::Null, user_info.clone())
        .await?;
    assert_eq!(output, "1970/1970");
    assert!(user_info.contains(DATE_FORMAT_CACHE_KEY));
    Ok(())
}

#[tokio::test]
async fn invalid_date_formats() {
    templatekit_testhelpers::setup();
    let (tag, reason) = tag_error(r#"#date(0, "[nonsense]")"#).await;
    assert_eq!(tag, "date");
    assert!(reason.starts_with("Invalid date format"), "{reason}");

    let (_, reason) = tag_error(r#"#date("soon")"#).await;
    assert_eq!(reason, "Expected a Unix timestamp in seconds");
}

#[tokio::test]
async fn set_refuses_indexes_far_past_the_end() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let (tag, reason) = tag_error(r#"#set("a.18446744073709551615", 1)"#).await;
    assert_eq!(tag, "set");
    assert_eq!(
        reason,
        "Index 18446744073709551615 is too far past the end of an array of length 0"
    );
    let (_, reason) = tag_error(r#"#set("a.4000000000000", 1)"#).await;
    assert!(reason.starts_with("Index 4000000000000 is too far"), "{reason}");

    assert_eq!(render(r#"#set("list.2", "x")#count(list)"#, Value::Null).await?, "3");
    Ok(())
}

#[tokio::test]
async fn arity_and_body_checks() {
    templatekit_testhelpers::setup();
    let cases = [
        ("#lowercase()", "lowercase", "Invalid parameter count: 0/1"),
        ("#contains(1)", "contains", "Invalid parameter count: 1/2"),
        (r#"#set("a", 1, 2)"#, "set", "Invalid parameter count: 3/2"),
        (r#"#get("x") {body}"#, "get", "Extraneous body"),
        (r#"#var("x")"#, "var", "Missing body"),
        ("#set(nothing, 2)", "set", "Unsupported key type"),
    ];
    for (template, expected_tag, expected_reason) in cases {
        let (tag, reason) = tag_error(template).await;
        assert_eq!(tag, expected_tag, "{template}");
        assert_eq!(reason, expected_reason, "{template}");
    }
}

#[tokio::test]
async fn custom_tags_extend_the_defaults() -> Result<(), IPanic> {
    templatekit_testhelpers::setup();
    let mut tags = default_tags();
    tags.register_fn("repeat", |tag: &TagContext| {
        tag.require_parameter_count(2)?;
        let text = tag.parameter(0).as_string().unwrap_or_default().into_owned();
        let times = tag.parameter(1).as_int().unwrap_or(0).max(0) as usize;
        Ok(Value::String(text.repeat(times)))
    });
    let renderer = TemplateRenderer::builder(templatekit::KitParser)
        .tags(tags)
        .build();
    assert!(renderer.tags().contains("repeat"));
    let output = renderer
        .render_bytes(r#"#repeat("ab", 3)|#lowercase("X")"#, Value::Null, "custom.kit")
        .await?;
    assert_eq!(output, "ababab|x");
    Ok(())
}

#[test]
fn registry_bookkeeping() {
    templatekit_testhelpers::setup();
    let mut tags = TagRegistry::new();
    assert!(tags.is_empty());
    tags.register_fn("b", |_: &TagContext| Ok(Value::Null))
        .register_fn("a", |_: &TagContext| Ok(Value::Null));
    assert_eq!(tags.names(), ["a", "b"]);
    assert!(tags.remove("a").is_some());
    assert_eq!(tags.len(), 1);

    let defaults = default_tags();
    assert_eq!(
        defaults.names(),
        [
            "", "capitalize", "comment", "contains", "count", "date", "get", "lowercase", "set",
            "uppercase", "var",
        ]
    );
}
