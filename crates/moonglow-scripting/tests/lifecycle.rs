//! End-to-end lifecycle tests: an offline session, a temp script folder
//! and a manually driven tick loop standing in for the runner.

use std::fs;
use std::str::FromStr;
use std::time::{Duration, Instant};

use moonglow_client::config::Settings;
use moonglow_client::{GameSession, OutboundMessage, RecordingSink};
use moonglow_events::KeyCombo;
use moonglow_scripting::SessionContext;

fn context_with_scripts(
    files: &[(&str, &str)],
) -> (SessionContext, RecordingSink, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }
    let (session, net) = GameSession::offline("Tester");
    let mut ctx = SessionContext::new(session, dir.path().to_path_buf(), &Settings::default());
    ctx.core().scripts.scan();
    (ctx, net, dir)
}

/// Tick until `done` holds or the deadline passes.
fn tick_until(
    ctx: &mut SessionContext,
    deadline: Duration,
    mut done: impl FnMut(&mut SessionContext) -> bool,
) -> bool {
    let end = Instant::now() + deadline;
    loop {
        ctx.tick();
        if done(ctx) {
            return true;
        }
        if Instant::now() >= end {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn speech_lines(net: &RecordingSink) -> Vec<String> {
    net.handle()
        .lock()
        .unwrap()
        .iter()
        .filter_map(|m| match m {
            OutboundMessage::Speech { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn play_and_stop_are_idempotent() {
    let (mut ctx, _net, _dir) =
        context_with_scripts(&[("idle.scr", "loop\npause 50\nendloop\n")]);

    let core = ctx.core();
    core.scripts.play("idle.scr", &mut core.session);
    core.scripts.play("idle.scr", &mut core.session);
    assert!(core.scripts.is_playing("idle.scr"));
    assert_eq!(core.scripts.running_count(), 1);

    core.scripts.stop("idle.scr", &mut core.session);
    core.scripts.stop("idle.scr", &mut core.session);
    assert!(!core.scripts.is_playing("idle.scr"));
    assert_eq!(core.scripts.running_count(), 0);
}

#[test]
fn toggle_flips_play_state() {
    let (mut ctx, _net, _dir) =
        context_with_scripts(&[("idle.scr", "loop\npause 50\nendloop\n")]);

    let core = ctx.core();
    core.scripts.toggle("idle.scr", &mut core.session);
    assert!(core.scripts.is_playing("idle.scr"));
    core.scripts.toggle("idle.scr", &mut core.session);
    assert!(!core.scripts.is_playing("idle.scr"));
}

#[test]
fn unknown_script_reports_to_player() {
    let (mut ctx, _net, _dir) = context_with_scripts(&[]);
    let core = ctx.core();
    core.scripts.play("nope.scr", &mut core.session);
    assert!(core
        .session
        .journal_texts()
        .iter()
        .any(|t| t.contains("No such script")));
}

#[test]
fn faulty_cooperative_script_is_removed_with_message() {
    let (mut ctx, net, _dir) =
        context_with_scripts(&[("bad.scr", "say hello\nfrobnicate 1\n")]);

    {
        let core = ctx.core();
        core.scripts.play("bad.scr", &mut core.session);
    }
    // First tick runs the say, second hits the unknown command.
    ctx.tick();
    ctx.tick();

    let core = ctx.core();
    assert!(!core.scripts.is_playing("bad.scr"));
    assert_eq!(core.scripts.running_count(), 0);
    assert_eq!(speech_lines(&net), vec!["hello".to_string()]);
    assert!(core
        .session
        .journal_texts()
        .iter()
        .any(|t| t.contains("bad.scr") && t.contains("error")));
}

#[test]
fn faulty_script_removal_leaves_others_running() {
    let (mut ctx, net, _dir) = context_with_scripts(&[
        ("bad.scr", "frobnicate 1\n"),
        ("chatty.scr", "loop\nsay tick\nendloop\n"),
    ]);
    {
        let core = ctx.core();
        core.scripts.play("bad.scr", &mut core.session);
        core.scripts.play("chatty.scr", &mut core.session);
    }
    // First tick steps both and removes the faulty one.
    ctx.tick();
    {
        let core = ctx.core();
        assert!(!core.scripts.is_playing("bad.scr"));
        assert!(core.scripts.is_playing("chatty.scr"));
        assert_eq!(core.scripts.running_count(), 1);
    }

    // The survivor keeps stepping on later ticks. The loop body is
    // three statements, so six ticks land on `say` at least twice.
    let before = speech_lines(&net).len();
    for _ in 0..6 {
        ctx.tick();
    }
    assert!(speech_lines(&net).len() >= before + 2);
}

#[test]
fn cooperative_script_finishes_quietly() {
    let (mut ctx, net, _dir) = context_with_scripts(&[("greet.scr", "say hi\nsay bye\n")]);
    {
        let core = ctx.core();
        core.scripts.play("greet.scr", &mut core.session);
    }
    assert!(tick_until(&mut ctx, Duration::from_secs(1), |ctx| {
        ctx.core().scripts.running_count() == 0
    }));
    assert_eq!(speech_lines(&net), vec!["hi".to_string(), "bye".to_string()]);
}

#[test]
fn cooperative_script_reacts_to_journal() {
    let script = concat!(
        "loop\n",
        "if injournal \"ding\"\n",
        "say heard\n",
        "stop\n",
        "endif\n",
        "pause 10\n",
        "endloop\n",
    );
    let (mut ctx, net, _dir) = context_with_scripts(&[("watch.scr", script)]);
    {
        let core = ctx.core();
        core.scripts.play("watch.scr", &mut core.session);
    }
    // A few silent passes first.
    for _ in 0..5 {
        ctx.tick();
    }
    assert!(speech_lines(&net).is_empty());

    ctx.core().session.sys_message("ding");
    assert!(tick_until(&mut ctx, Duration::from_secs(2), |ctx| {
        ctx.core().scripts.running_count() == 0
    }));
    assert_eq!(speech_lines(&net), vec!["heard".to_string()]);
}

#[test]
fn threaded_script_runs_to_completion() {
    let (mut ctx, net, _dir) =
        context_with_scripts(&[("hello.rhai", "say(\"from thread\");\n")]);
    {
        let core = ctx.core();
        core.scripts.play("hello.rhai", &mut core.session);
        assert!(core.scripts.is_playing("hello.rhai"));
    }
    assert!(tick_until(&mut ctx, Duration::from_secs(2), |ctx| {
        ctx.core().scripts.running_count() == 0
    }));
    assert_eq!(speech_lines(&net), vec!["from thread".to_string()]);
}

#[test]
fn threaded_stop_unwinds_long_pause_quickly() {
    let (mut ctx, _net, _dir) =
        context_with_scripts(&[("sleepy.rhai", "pause(30000);\n")]);
    {
        let core = ctx.core();
        core.scripts.play("sleepy.rhai", &mut core.session);
    }
    // Let the worker reach its pause.
    std::thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    {
        let core = ctx.core();
        core.scripts.stop("sleepy.rhai", &mut core.session);
    }
    assert!(tick_until(&mut ctx, Duration::from_secs(2), |ctx| {
        ctx.core().scripts.running_count() == 0
    }));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!ctx.core().scripts.is_playing("sleepy.rhai"));
}

#[test]
fn replay_waits_for_worker_teardown() {
    let (mut ctx, _net, _dir) =
        context_with_scripts(&[("sleepy.rhai", "pause(30000);\n")]);
    {
        let core = ctx.core();
        core.scripts.play("sleepy.rhai", &mut core.session);
    }
    std::thread::sleep(Duration::from_millis(50));

    // Stop, then replay before the worker has been finalized: the
    // replay must not spawn a second worker over the dying one.
    {
        let core = ctx.core();
        core.scripts.stop("sleepy.rhai", &mut core.session);
        core.scripts.play("sleepy.rhai", &mut core.session);
        assert_eq!(core.scripts.running_count(), 1);
    }
    assert!(tick_until(&mut ctx, Duration::from_secs(2), |ctx| {
        ctx.core().scripts.running_count() == 0
    }));

    // Once teardown has landed, replay works again.
    {
        let core = ctx.core();
        core.scripts.play("sleepy.rhai", &mut core.session);
        assert!(core.scripts.is_playing("sleepy.rhai"));
        core.scripts.stop("sleepy.rhai", &mut core.session);
    }
    assert!(tick_until(&mut ctx, Duration::from_secs(2), |ctx| {
        ctx.core().scripts.running_count() == 0
    }));
}

#[test]
fn threaded_runtime_fault_reports_to_player() {
    let (mut ctx, _net, _dir) =
        context_with_scripts(&[("crash.rhai", "let x = 1 / 0;\n")]);
    {
        let core = ctx.core();
        core.scripts.play("crash.rhai", &mut core.session);
    }
    assert!(tick_until(&mut ctx, Duration::from_secs(2), |ctx| {
        ctx.core().scripts.running_count() == 0
    }));
    assert!(ctx
        .core()
        .session
        .journal_texts()
        .iter()
        .any(|t| t.contains("crash.rhai") && t.contains("error")));
}

#[test]
fn hotkey_callbacks_run_on_dispatch() {
    let script = concat!(
        "fn on_heal() { say(\"healing\"); }\n",
        "bind_hotkey(\"ctrl+h\", \"on_heal\");\n",
        "while dispatch_callbacks() == 0 { pause(20); }\n",
    );
    let (mut ctx, net, _dir) = context_with_scripts(&[("keys.rhai", script)]);
    let handle = ctx.handle();
    {
        let core = ctx.core();
        core.scripts.play("keys.rhai", &mut core.session);
    }
    // Let the worker install its binding before pressing.
    tick_until(&mut ctx, Duration::from_millis(200), |_| false);

    let combo = KeyCombo::from_str("ctrl+h").unwrap();
    handle.key_down(combo);
    handle.key_up(combo);

    assert!(tick_until(&mut ctx, Duration::from_secs(2), |ctx| {
        ctx.core().scripts.running_count() == 0
    }));
    assert_eq!(speech_lines(&net), vec!["healing".to_string()]);
}

#[test]
fn stop_self_tears_down_through_the_queue() {
    let script = "say(\"once\");\nstop_script();\nsay(\"never\");\n";
    let (mut ctx, net, _dir) = context_with_scripts(&[("quit.rhai", script)]);
    {
        let core = ctx.core();
        core.scripts.play("quit.rhai", &mut core.session);
    }
    assert!(tick_until(&mut ctx, Duration::from_secs(2), |ctx| {
        ctx.core().scripts.running_count() == 0
    }));
    assert_eq!(speech_lines(&net), vec!["once".to_string()]);
    // A self-stop is not a fault.
    assert!(!ctx
        .core()
        .session
        .journal_texts()
        .iter()
        .any(|t| t.contains("quit.rhai") && t.contains("error")));
}

#[test]
fn shared_vars_cross_between_scripts() {
    let writer = "set_shared(\"flag\", \"ready\");\n";
    let reader = concat!(
        "while get_shared(\"flag\") != \"ready\" { pause(10); }\n",
        "say(\"saw it\");\n",
    );
    let (mut ctx, net, _dir) =
        context_with_scripts(&[("writer.rhai", writer), ("reader.rhai", reader)]);
    {
        let core = ctx.core();
        core.scripts.play("reader.rhai", &mut core.session);
        core.scripts.play("writer.rhai", &mut core.session);
    }
    assert!(tick_until(&mut ctx, Duration::from_secs(2), |ctx| {
        ctx.core().scripts.running_count() == 0
    }));
    assert_eq!(speech_lines(&net), vec!["saw it".to_string()]);
}

#[test]
fn scan_skips_reserved_and_underscore_files() {
    let (mut ctx, _net, _dir) = context_with_scripts(&[
        ("lib.rhai", "fn helper() {}\n"),
        ("_draft.scr", "say wip\n"),
        ("real.scr", "say ok\n"),
        ("notes.txt", "not a script\n"),
        ("combat/heal.scr", "say heal\n"),
    ]);
    let names: Vec<String> = ctx
        .core()
        .scripts
        .list()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["combat/heal.scr".to_string(), "real.scr".to_string()]);
}

#[test]
fn shutdown_finalizes_running_workers() {
    let (mut ctx, _net, _dir) =
        context_with_scripts(&[("sleepy.rhai", "pause(30000);\n")]);
    {
        let core = ctx.core();
        core.scripts.play("sleepy.rhai", &mut core.session);
    }
    std::thread::sleep(Duration::from_millis(50));
    ctx.shutdown();
    assert_eq!(ctx.core().scripts.running_count(), 0);
}
