//! End-to-end dispatch behavior with a scripted selector and a recording
//! fake transport.

mod common;

use std::sync::Arc;

use common::{quiet_config, FailKind, FakeRecognizer, FakeSelector, FakeTransport};
use serde_json::json;
use tv_agent::device::{AppId, Key};
use tv_agent::dispatch::{Dispatcher, Outcome};
use tv_agent::selector::{RawInvocation, SelectorOutcome};
use tv_agent::transport::Directive;
use tv_agent::vision::TextRecognizer;
use tv_agent::{Catalog, UserPreference};

fn invocation(name: &str, arguments: serde_json::Value) -> RawInvocation {
    RawInvocation {
        name: name.to_string(),
        arguments,
    }
}

fn dispatcher(
    transport: Arc<FakeTransport>,
    selector: FakeSelector,
    recognizer: Option<Arc<dyn TextRecognizer>>,
) -> Dispatcher {
    Dispatcher::new(
        Arc::new(Catalog::standard()),
        transport,
        Arc::new(selector),
        recognizer,
        Arc::new(quiet_config()),
    )
}

fn preference() -> UserPreference {
    UserPreference {
        user_id: "alice".to_string(),
        netflix_profile_index: 2,
        netflix_pin: Some("1234".to_string()),
        youtube_account_index: None,
        youtube_account_name: None,
    }
}

#[tokio::test]
async fn zero_invocations_returns_selector_reply_verbatim() {
    let transport = Arc::new(FakeTransport::new());
    let selector = FakeSelector::returning(SelectorOutcome {
        invocations: vec![],
        reply: Some("I can only control the TV.".to_string()),
    });
    let dispatcher = dispatcher(transport.clone(), selector, None);

    let response = dispatcher.dispatch("what is the weather", None).await;

    assert!(response.success);
    assert_eq!(response.message, "I can only control the TV.");
    assert!(response.results.is_empty());
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn zero_invocations_without_reply_reports_no_action() {
    let transport = Arc::new(FakeTransport::new());
    let selector = FakeSelector::returning(SelectorOutcome::default());
    let dispatcher = dispatcher(transport, selector, None);

    let response = dispatcher.dispatch("hmm", None).await;

    assert!(response.success);
    assert_eq!(response.message, "no action taken");
}

#[tokio::test]
async fn volume_up_by_three_presses_three_times() {
    let transport = Arc::new(FakeTransport::new());
    let selector = FakeSelector::returning(SelectorOutcome {
        invocations: vec![invocation(
            "tv_volume",
            json!({"action": "up", "steps": 3}),
        )],
        reply: None,
    });
    let dispatcher = dispatcher(transport.clone(), selector, None);

    let response = dispatcher.dispatch("turn the volume up by 3", None).await;

    assert!(response.success);
    assert_eq!(response.message, "volume increased by 3");
    assert_eq!(
        transport.sent(),
        vec![Directive::KeyPress(Key::VolumeUp); 3]
    );
}

#[tokio::test]
async fn out_of_range_steps_clamp_before_execution() {
    let transport = Arc::new(FakeTransport::new());
    let selector = FakeSelector::returning(SelectorOutcome {
        invocations: vec![invocation(
            "tv_volume",
            json!({"action": "down", "steps": 99}),
        )],
        reply: None,
    });
    let dispatcher = dispatcher(transport.clone(), selector, None);

    let response = dispatcher.dispatch("volume way down", None).await;

    assert!(response.success);
    assert_eq!(response.message, "volume decreased by 15");
    assert_eq!(transport.sent().len(), 15);
}

#[tokio::test]
async fn netflix_launch_with_stored_preference_selects_profile() {
    let transport = Arc::new(FakeTransport::new());
    let selector = FakeSelector::returning(SelectorOutcome {
        invocations: vec![invocation("netflix_launch", json!({}))],
        reply: None,
    });
    let dispatcher = dispatcher(transport.clone(), selector, None);

    let response = dispatcher
        .dispatch("open Netflix", Some(&preference()))
        .await;

    assert!(response.success);
    assert!(response.message.contains("profile 2"));
    assert_eq!(
        transport.sent(),
        vec![
            Directive::LaunchApp(AppId::Netflix),
            Directive::KeyPress(Key::Down),
            Directive::KeyPress(Key::Ok),
            Directive::KeyPress(Key::Digit(1)),
            Directive::KeyPress(Key::Digit(2)),
            Directive::KeyPress(Key::Digit(3)),
            Directive::KeyPress(Key::Digit(4)),
        ]
    );
}

#[tokio::test]
async fn netflix_launch_without_preference_stays_plain() {
    let transport = Arc::new(FakeTransport::new());
    let selector = FakeSelector::returning(SelectorOutcome {
        invocations: vec![invocation("netflix_launch", json!({}))],
        reply: None,
    });
    let dispatcher = dispatcher(transport.clone(), selector, None);

    let response = dispatcher.dispatch("open Netflix", None).await;

    assert!(response.success);
    assert_eq!(response.message, "launched Netflix");
    assert_eq!(
        transport.sent(),
        vec![Directive::LaunchApp(AppId::Netflix)]
    );
}

#[tokio::test]
async fn unknown_capability_is_skipped_while_siblings_run() {
    let transport = Arc::new(FakeTransport::new());
    let selector = FakeSelector::returning(SelectorOutcome {
        invocations: vec![
            invocation("make_tea", json!({})),
            invocation("play_pause", json!({})),
        ],
        reply: None,
    });
    let dispatcher = dispatcher(transport.clone(), selector, None);

    let response = dispatcher.dispatch("tea and pause", None).await;

    assert!(!response.success);
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].outcome, Outcome::Failure);
    assert!(response.results[0].message.contains("make_tea"));
    assert_eq!(response.results[1].outcome, Outcome::Success);
    // The unknown name never reached the transport.
    assert_eq!(
        transport.sent(),
        vec![Directive::KeyPress(Key::PlayPause)]
    );
}

#[tokio::test]
async fn invalid_arguments_fail_that_invocation_only() {
    let transport = Arc::new(FakeTransport::new());
    let selector = FakeSelector::returning(SelectorOutcome {
        invocations: vec![
            invocation("tv_remote", json!({"key": "volume_up"})),
            invocation("stop_playback", json!({})),
        ],
        reply: None,
    });
    let dispatcher = dispatcher(transport.clone(), selector, None);

    let response = dispatcher.dispatch("weird remote press then stop", None).await;

    assert!(!response.success);
    assert_eq!(response.results[0].outcome, Outcome::Failure);
    assert_eq!(response.results[1].outcome, Outcome::Success);
    assert_eq!(transport.sent(), vec![Directive::KeyPress(Key::Stop)]);
}

#[tokio::test]
async fn timeout_in_one_invocation_leaves_earlier_and_later_results_alone() {
    let transport = Arc::new(FakeTransport::new());
    // play_pause is send #1; the navigate sequence occupies #2..#6 and its
    // third press (#4) times out; the final play_pause is #5 after the abort.
    transport.fail_on_send(4, FailKind::Timeout);
    let selector = FakeSelector::returning(SelectorOutcome {
        invocations: vec![
            invocation("play_pause", json!({})),
            invocation("tv_navigate", json!({"direction": "down", "steps": 5})),
            invocation("play_pause", json!({})),
        ],
        reply: None,
    });
    let dispatcher = dispatcher(transport.clone(), selector, None);

    let response = dispatcher.dispatch("pause, scroll, pause", None).await;

    assert!(!response.success);
    assert_eq!(response.results.len(), 3);
    assert_eq!(response.results[0].outcome, Outcome::Success);
    assert_eq!(response.results[1].outcome, Outcome::Failure);
    assert!(response.results[1].message.contains("timed out"));
    // The failed invocation stopped mid-sequence; the later one still ran.
    assert_eq!(response.results[2].outcome, Outcome::Success);
    assert_eq!(
        transport.sent(),
        vec![
            Directive::KeyPress(Key::PlayPause),
            Directive::KeyPress(Key::Down),
            Directive::KeyPress(Key::Down),
            Directive::KeyPress(Key::PlayPause),
        ]
    );
}

#[tokio::test]
async fn selector_failure_fails_whole_command_with_no_side_effects() {
    let transport = Arc::new(FakeTransport::new());
    let selector = FakeSelector::failing("model endpoint unreachable");
    let dispatcher = dispatcher(transport.clone(), selector, None);

    let response = dispatcher.dispatch("open Netflix", None).await;

    assert!(!response.success);
    assert!(response.message.contains("model endpoint unreachable"));
    assert!(response.results.is_empty());
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn account_label_not_on_screen_yields_partial_with_detected_names() {
    let transport = Arc::new(FakeTransport::new());
    let recognizer: Arc<dyn TextRecognizer> =
        Arc::new(FakeRecognizer::with_names(&["Alex", "Jordan"]));
    let selector = FakeSelector::returning(SelectorOutcome {
        invocations: vec![invocation(
            "youtube_select_account",
            json!({"account_name": "Guest"}),
        )],
        reply: None,
    });
    let dispatcher = dispatcher(transport.clone(), selector, Some(recognizer));

    let response = dispatcher.dispatch("switch to the Guest account", None).await;

    assert!(!response.success);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].outcome, Outcome::Partial);
    let detail = response.results[0].detail.as_ref().unwrap();
    assert_eq!(detail["detected_labels"], json!(["Alex", "Jordan"]));
}

#[tokio::test]
async fn multiple_invocations_execute_in_selector_order() {
    let transport = Arc::new(FakeTransport::new());
    let selector = FakeSelector::returning(SelectorOutcome {
        invocations: vec![
            invocation("tv_remote", json!({"key": "home"})),
            invocation("youtube_launch", json!({})),
        ],
        reply: None,
    });
    let dispatcher = dispatcher(transport.clone(), selector, None);

    let response = dispatcher.dispatch("go home then open youtube", None).await;

    assert!(response.success);
    assert_eq!(response.message, "pressed home | launched YouTube");
    assert_eq!(
        transport.sent(),
        vec![
            Directive::KeyPress(Key::Home),
            Directive::LaunchApp(AppId::YouTube),
        ]
    );
}

#[tokio::test]
async fn current_app_query_names_known_packages() {
    let transport = Arc::new(FakeTransport::new());
    transport.set_foreground(
        "mCurrentFocus=Window{1a2b3c u0 com.netflix.ninja/com.netflix.ninja.MainActivity}",
    );
    let selector = FakeSelector::returning(SelectorOutcome {
        invocations: vec![invocation("tv_current_app", json!({}))],
        reply: None,
    });
    let dispatcher = dispatcher(transport.clone(), selector, None);

    let response = dispatcher.dispatch("what app is this", None).await;

    assert!(response.success);
    assert_eq!(response.message, "current app: Netflix");
}
