//! Typed host commands over a scripted host.

use std::collections::HashSet;
use std::future::Future;

use serde_json::Value;
use serde_json::json;

use hostlink::Bridge;
use hostlink::BridgeConfig;
use hostlink::ChannelId;
use hostlink::HostApi;
use hostlink::HostEvent;
use hostlink::bridge;
use hostlink::commands::COMMANDS;
use hostlink::commands::GeneratorConfig;
use hostlink::commands::OpenLocation;
use hostlink::commands::PhraseData;
use hostlink::envelope::CommandEnvelope;
use hostlink::event::Token;
use hostlink::mock_transport::MockHost;

fn connect() -> (HostApi, MockHost) {
    let bridge = Bridge::new(BridgeConfig::default());
    let (transport, host) = MockHost::connect();
    bridge.attach(Box::new(transport)).expect("attach failed");
    (HostApi::new(bridge), host)
}

fn generator() -> GeneratorConfig {
    GeneratorConfig {
        characters: true,
        digits: true,
        punctuation: false,
        special: false,
        length: 24,
    }
}

/// Runs `call` while the host answers its single command with `answer`.
async fn exchange<T, F>(
    host: &mut MockHost,
    call: F,
    answer: impl FnOnce(&MockHost, &CommandEnvelope),
) -> (CommandEnvelope, T)
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::spawn(call);
    let envelope = host.next_envelope().await.expect("no command sent");
    answer(host, &envelope);
    let result = task.await.expect("call task panicked");
    (envelope, result)
}

#[tokio::test]
async fn test_generate_mnemonic_phrase() -> anyhow::Result<()> {
    let (api, mut host) = connect();
    let client = api.clone();

    let (envelope, result) = exchange(
        &mut host,
        async move { client.generate_mnemonic_phrase(&generator()).await },
        |host, env| {
            host.resolve(env, json!({"phrase": ["abandon", "ability"], "password": "x7Kq"}));
        },
    )
    .await;

    assert_eq!(envelope.command, "generateMnemonicPhrase");
    assert_eq!(
        envelope.inner,
        vec![json!({"characters": true, "digits": true, "punctuation": false, "special": false, "length": 24})]
    );
    assert_eq!(
        result?,
        PhraseData {
            phrase: vec!["abandon".into(), "ability".into()],
            password: "x7Kq".into(),
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_from_mnemonic_phrase_sends_positional_arguments() -> anyhow::Result<()> {
    let (api, mut host) = connect();
    let client = api.clone();
    let phrase: Vec<String> = vec!["zoo".into(), "zone".into()];

    let (envelope, result) = exchange(
        &mut host,
        async move { client.from_mnemonic_phrase(&phrase, &generator()).await },
        |host, env| host.resolve(env, json!({"phrase": ["zoo", "zone"], "password": "p"})),
    )
    .await;

    assert_eq!(envelope.command, "fromMnemonicPhrase");
    assert_eq!(envelope.inner.len(), 2);
    assert_eq!(envelope.inner[0], json!(["zoo", "zone"]));
    assert_eq!(result?.password, "p");
    Ok(())
}

#[tokio::test]
async fn test_unit_commands_accept_null() -> anyhow::Result<()> {
    let (api, mut host) = connect();
    let client = api.clone();

    let (envelope, result) = exchange(
        &mut host,
        async move { client.window_show_sys_menu(120, -4).await },
        |host, env| host.resolve(env, Value::Null),
    )
    .await;

    assert_eq!(envelope.command, "windowShowSysMenu");
    assert_eq!(envelope.inner, vec![json!(120), json!(-4)]);
    result?;
    Ok(())
}

#[tokio::test]
async fn test_config_round_trip() -> anyhow::Result<()> {
    let (api, mut host) = connect();
    let path: Vec<String> = ["globalConfig", "generalApp", "showOnStart"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let client = api.clone();
    let set_path = path.clone();
    let (set, result) = exchange(
        &mut host,
        async move { client.config_set_property(&set_path, &json!(true)).await },
        |host, env| host.resolve(env, Value::Null),
    )
    .await;
    result?;
    assert_eq!(set.command, "configSetProperty");
    assert_eq!(set.inner, vec![json!(path), json!(true)]);

    let client = api.clone();
    let (get, value) = exchange(
        &mut host,
        async move { client.config_get_property(&path).await },
        |host, env| host.resolve(env, Value::Null),
    )
    .await;
    assert_eq!(get.command, "configGetProperty");
    assert_eq!(value?, Value::Null);
    Ok(())
}

#[tokio::test]
async fn test_remote_rejection_surfaces() {
    let (api, mut host) = connect();
    let client = api.clone();

    let (_, result) = exchange(
        &mut host,
        async move { client.config_set_property(&[], &json!({})).await },
        |host, env| host.reject(env, json!("dottedPath musn't be empty")),
    )
    .await;

    match result {
        Err(bridge::Error::Remote(payload)) => assert_eq!(payload, json!("dottedPath musn't be empty")),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_wrong_result_shape_is_a_decode_error() {
    let (api, mut host) = connect();
    let client = api.clone();

    let (_, result) = exchange(
        &mut host,
        async move { client.config_is_file().await },
        |host, env| host.resolve(env, json!({"exists": true})),
    )
    .await;

    assert!(matches!(result, Err(bridge::Error::Decode(_))));
}

#[tokio::test]
async fn test_commands_before_attach_are_not_ready() {
    let api = HostApi::new(Bridge::new(BridgeConfig::default()));
    assert!(matches!(api.set_initialized().await, Err(bridge::Error::NotReady)));
}

#[test]
fn test_command_names_are_unique() {
    let unique: HashSet<_> = COMMANDS.iter().collect();
    assert_eq!(unique.len(), COMMANDS.len());
    assert!(COMMANDS.contains(&"windowSetTitle"));
    assert!(COMMANDS.contains(&"configObserveProperty"));
}

#[tokio::test]
async fn test_ui_events_decode_open_location() {
    let (api, mut host) = connect();
    let mut locations = api.ui_events();

    let envelope = host.next_envelope().await.expect("establishChannel");
    assert_eq!(envelope.inner[0], json!("ui-events"));
    let token: Token = serde_json::from_value(envelope.inner[1].clone()).expect("token");

    let id = ChannelId(json!([7, 7, 7, [0, 0, 0, 0, 0, 0, 0, 7]]));
    host.emit(HostEvent::Accept { token, accept_id: id.clone() });
    host.emit(HostEvent::Message { channel_id: id, data: json!("Retrieve"), resolver: None });

    let location = locations.recv().await.expect("location").expect("decoded");
    assert_eq!(location, OpenLocation::Retrieve);
}
