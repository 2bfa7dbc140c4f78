//! Rhai integration for threaded scripts
//!
//! Each threaded script gets an isolated `Engine` and `Scope` on a dedicated
//! worker thread; neither ever leaves that thread. The whole host API is
//! registered explicitly, function by function, against a cloned
//! [`ScriptBridge`]. Cancellation is cooperative: the engine's progress hook
//! observes the stop token and terminates evaluation, which the top level
//! treats as an intentional stop, not an error.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use rhai::module_resolvers::FileModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, NativeCallContext, Position, Scope, INT};
use tracing::{debug, info};

use moonglow_client::world::{LockState, Stat};
use moonglow_client::Serial;

use crate::bridge::ScriptBridge;
use crate::error::ScriptError;

/// Worker configuration carried from the manager
pub struct EngineConfig {
    /// Root for `import` resolution (the shared-library file lives here)
    pub module_root: Option<PathBuf>,
    /// Cache compiled modules between imports
    pub cache_modules: bool,
}

/// Spawn the dedicated worker thread for one threaded script.
///
/// The worker's final act is to hand teardown back to the session thread
/// via [`ScriptBridge::finish`]; nothing is released on the dying thread.
pub fn spawn_worker(
    source: String,
    bridge: ScriptBridge,
    config: EngineConfig,
) -> std::io::Result<JoinHandle<()>> {
    let name = bridge.script_name().to_string();
    thread::Builder::new()
        .name(format!("script-{name}"))
        .spawn(move || {
            debug!(target: "scripting", "{}: worker started", name);
            let error = run_source(&source, &bridge, &config);
            match &error {
                Some(message) => debug!(target: "scripting", "{}: worker failed: {}", name, message),
                None => debug!(target: "scripting", "{}: worker finished", name),
            }
            bridge.finish(error);
        })
}

/// Execute the script source to completion. Returns a formatted error for
/// runtime faults; a cooperative stop returns `None`.
fn run_source(source: &str, bridge: &ScriptBridge, config: &EngineConfig) -> Option<String> {
    let mut engine = Engine::new();
    engine.set_fast_operators(true);

    let stop = bridge.stop_token().clone();
    engine.on_progress(move |_ops| {
        if stop.is_stopped() {
            Some(Dynamic::UNIT)
        } else {
            None
        }
    });

    if let Some(root) = &config.module_root {
        let mut resolver = FileModuleResolver::new_with_path(root);
        resolver.enable_cache(config.cache_modules);
        engine.set_module_resolver(resolver);
    }

    register_api(&mut engine, bridge.clone());

    let mut scope = Scope::new();
    match engine.run_with_scope(&mut scope, source) {
        Ok(()) => None,
        Err(err) => match *err {
            // The progress hook fired or a wait observed the stop token;
            // ordinary control flow, nothing to report.
            EvalAltResult::ErrorTerminated(..) => None,
            other => Some(other.to_string()),
        },
    }
}

/// Convert a script error into a rhai error. The stop signal becomes a
/// termination so the run unwinds without producing a reportable fault.
fn to_rhai(err: ScriptError) -> Box<EvalAltResult> {
    if err.is_stop() {
        Box::new(EvalAltResult::ErrorTerminated(Dynamic::UNIT, Position::NONE))
    } else {
        err.to_string().into()
    }
}

fn to_serial(raw: INT) -> Serial {
    u32::try_from(raw).map(Serial).unwrap_or(Serial::ZERO)
}

fn parse_lock(word: &str) -> Option<LockState> {
    match word.to_ascii_lowercase().as_str() {
        "up" => Some(LockState::Up),
        "down" => Some(LockState::Down),
        "locked" => Some(LockState::Locked),
        _ => None,
    }
}

/// Explicit registration table for the whole bridge surface
fn register_api(engine: &mut Engine, bridge: ScriptBridge) {
    // Speech and messages
    let b = bridge.clone();
    engine.register_fn("say", move |text: &str| b.say(text));
    let b = bridge.clone();
    engine.register_fn("emote", move |text: &str| b.emote(text));
    let b = bridge.clone();
    engine.register_fn("sys_msg", move |text: &str| b.sys_msg(text));
    let b = bridge.clone();
    engine.register_fn("head_msg", move |serial: INT, text: &str| {
        b.head_msg(to_serial(serial), text)
    });

    // Object interaction
    let b = bridge.clone();
    engine.register_fn(
        "use_item",
        move |serial: INT| -> Result<bool, Box<EvalAltResult>> {
            b.use_item(to_serial(serial)).map_err(to_rhai)
        },
    );
    let b = bridge.clone();
    engine.register_fn(
        "move_item",
        move |serial: INT, container: INT, amount: INT| -> Result<bool, Box<EvalAltResult>> {
            let amount = amount.clamp(1, INT::from(u16::MAX)) as u16;
            b.move_item(to_serial(serial), to_serial(container), amount)
                .map_err(to_rhai)
        },
    );
    let b = bridge.clone();
    engine.register_fn(
        "target",
        move |serial: INT| -> Result<bool, Box<EvalAltResult>> {
            b.target(to_serial(serial)).map_err(to_rhai)
        },
    );
    let b = bridge.clone();
    engine.register_fn("cancel_target", move || b.cancel_target());
    let b = bridge.clone();
    engine.register_fn(
        "reply_gump",
        move |gump_id: INT, button: INT| -> Result<bool, Box<EvalAltResult>> {
            b.reply_gump(gump_id as u32, button as u32).map_err(to_rhai)
        },
    );
    let b = bridge.clone();
    engine.register_fn(
        "pathfind_to",
        move |x: INT, y: INT, z: INT| -> Result<bool, Box<EvalAltResult>> {
            b.pathfind_to(x as i32, y as i32, z as i32).map_err(to_rhai)
        },
    );
    let b = bridge.clone();
    engine.register_fn("set_skill_lock", move |skill: &str, lock: &str| -> bool {
        match parse_lock(lock) {
            Some(lock) => {
                b.set_skill_lock(skill, lock);
                true
            }
            None => false,
        }
    });
    let b = bridge.clone();
    engine.register_fn("set_stat_lock", move |stat: &str, lock: &str| -> bool {
        let stat = match stat.to_ascii_lowercase().as_str() {
            "str" | "strength" => Stat::Strength,
            "dex" | "dexterity" => Stat::Dexterity,
            "int" | "intelligence" => Stat::Intelligence,
            _ => return false,
        };
        match parse_lock(lock) {
            Some(lock) => {
                b.set_stat_lock(stat, lock);
                true
            }
            None => false,
        }
    });

    // Queries; "not found" is serial 0
    let b = bridge.clone();
    engine.register_fn(
        "find_type",
        move |graphic: INT| -> Result<INT, Box<EvalAltResult>> {
            b.find_type(graphic as u16, None)
                .map(|s| INT::from(s.0))
                .map_err(to_rhai)
        },
    );
    let b = bridge.clone();
    engine.register_fn(
        "find_type_in",
        move |graphic: INT, container: INT| -> Result<INT, Box<EvalAltResult>> {
            b.find_type(graphic as u16, Some(to_serial(container)))
                .map(|s| INT::from(s.0))
                .map_err(to_rhai)
        },
    );
    let b = bridge.clone();
    engine.register_fn("find_nearest", move || -> Result<INT, Box<EvalAltResult>> {
        b.find_nearest().map(|s| INT::from(s.0)).map_err(to_rhai)
    });
    let b = bridge.clone();
    engine.register_fn("player", move || -> Result<INT, Box<EvalAltResult>> {
        b.player_serial().map(|s| INT::from(s.0)).map_err(to_rhai)
    });
    let b = bridge.clone();
    engine.register_fn("backpack", move || -> Result<INT, Box<EvalAltResult>> {
        b.backpack_serial().map(|s| INT::from(s.0)).map_err(to_rhai)
    });
    let b = bridge.clone();
    engine.register_fn("last_target", move || -> Result<INT, Box<EvalAltResult>> {
        b.last_target().map(|s| INT::from(s.0)).map_err(to_rhai)
    });
    let b = bridge.clone();
    engine.register_fn("last_found", move || -> INT { INT::from(b.last_found().0) });
    let b = bridge.clone();
    engine.register_fn(
        "distance_to",
        move |serial: INT| -> Result<INT, Box<EvalAltResult>> {
            b.distance_to(to_serial(serial)).map_err(to_rhai)
        },
    );

    // Waits
    let b = bridge.clone();
    engine.register_fn("pause", move |ms: INT| -> Result<(), Box<EvalAltResult>> {
        b.pause(ms.max(0) as u64).map_err(to_rhai)
    });
    let b = bridge.clone();
    engine.register_fn(
        "wait_for_target",
        move |ms: INT| -> Result<bool, Box<EvalAltResult>> {
            b.wait_for_target(ms.max(0) as u64).map_err(to_rhai)
        },
    );
    let b = bridge.clone();
    engine.register_fn(
        "wait_for_gump",
        move |ms: INT| -> Result<bool, Box<EvalAltResult>> {
            b.wait_for_gump(ms.max(0) as u64).map_err(to_rhai)
        },
    );
    let b = bridge.clone();
    engine.register_fn(
        "wait_for_journal",
        move |pattern: &str, ms: INT| -> Result<bool, Box<EvalAltResult>> {
            b.wait_for_journal(pattern, ms.max(0) as u64).map_err(to_rhai)
        },
    );

    // Journal
    let b = bridge.clone();
    engine.register_fn("in_journal", move |pattern: &str| -> bool {
        b.journal_contains(pattern, false)
    });
    let b = bridge.clone();
    engine.register_fn("in_journal_consume", move |pattern: &str| -> bool {
        b.journal_contains(pattern, true)
    });
    let b = bridge.clone();
    engine.register_fn("clear_journal", move || b.clear_journal());

    // Local bookkeeping
    let b = bridge.clone();
    engine.register_fn("ignore", move |serial: INT| b.ignore(to_serial(serial)));
    let b = bridge.clone();
    engine.register_fn("unignore", move |serial: INT| b.unignore(to_serial(serial)));
    let b = bridge.clone();
    engine.register_fn("clear_ignore", move || b.clear_ignore());
    let b = bridge.clone();
    engine.register_fn("set_shared", move |name: &str, value: &str| {
        b.set_shared(name, value)
    });
    let b = bridge.clone();
    engine.register_fn("get_shared", move |name: &str| -> String { b.get_shared(name) });
    let b = bridge.clone();
    engine.register_fn("unset_shared", move |name: &str| -> bool { b.unset_shared(name) });
    let b = bridge.clone();
    engine.register_fn("random", move |min: INT, max: INT| -> INT { b.random(min, max) });

    // Hotkeys and the deferred callback queue
    let b = bridge.clone();
    engine.register_fn("bind_hotkey", move |combo: &str, fn_name: &str| -> bool {
        b.bind_hotkey(combo, fn_name)
    });
    let b = bridge.clone();
    engine.register_fn("unbind_hotkey", move |combo: &str| -> bool { b.unbind_hotkey(combo) });
    let b = bridge.clone();
    engine.register_fn(
        "dispatch_callbacks",
        move |context: NativeCallContext| -> Result<INT, Box<EvalAltResult>> {
            let mut ran: INT = 0;
            for callback in b.drain_callbacks() {
                let fn_ptr = FnPtr::new(callback.fn_name.clone())?;
                let _: Dynamic = fn_ptr.call_within_context(&context, ())?;
                ran += 1;
            }
            Ok(ran)
        },
    );

    // Lifecycle
    let b = bridge;
    engine.register_fn("stop_script", move || -> Result<(), Box<EvalAltResult>> {
        info!(target: "scripting", "{}: requested stop of itself", b.script_name());
        b.stop_self();
        // Unwind immediately rather than running to the next wait.
        Err(Box::new(EvalAltResult::ErrorTerminated(
            Dynamic::UNIT,
            Position::NONE,
        )))
    });
}
