//! Registration tables for the command language
//!
//! Verbs with side effects are commands; value-producing queries are
//! expressions; aliases are live serial lookups. Everything is registered
//! explicitly by name — no discovery, no reflection.

use std::collections::HashMap;

use moonglow_client::world::{LockState, Stat};
use moonglow_client::{GameSession, Serial};

use crate::bridge::{RunState, SharedVars};
use crate::error::ScriptError;

use super::program::Value;

/// Everything a command may touch. Cooperative scripts execute on the
/// session thread, so they get the session directly — no marshaling.
pub struct CommandCtx<'a> {
    pub session: &'a mut GameSession,
    pub run: &'a RunState,
    pub vars: &'a SharedVars,
}

pub type CommandFn = fn(&mut CommandCtx, &[Value]) -> Result<(), ScriptError>;
pub type ExprFn = fn(&mut CommandCtx, &[Value]) -> Result<Value, ScriptError>;
pub type AliasFn = fn(&GameSession, &RunState) -> Serial;

/// The three lookup tables driving the stepper
pub struct CoopRegistry {
    commands: HashMap<&'static str, CommandFn>,
    expressions: HashMap<&'static str, ExprFn>,
    aliases: HashMap<&'static str, AliasFn>,
}

impl CoopRegistry {
    /// The standard command set
    pub fn standard() -> Self {
        let mut commands: HashMap<&'static str, CommandFn> = HashMap::new();
        commands.insert("say", cmd_say);
        commands.insert("emote", cmd_emote);
        commands.insert("sysmsg", cmd_sysmsg);
        commands.insert("headmsg", cmd_headmsg);
        commands.insert("useobject", cmd_useobject);
        commands.insert("moveitem", cmd_moveitem);
        commands.insert("target", cmd_target);
        commands.insert("canceltarget", cmd_canceltarget);
        commands.insert("replygump", cmd_replygump);
        commands.insert("pathfind", cmd_pathfind);
        commands.insert("setskilllock", cmd_setskilllock);
        commands.insert("setstatlock", cmd_setstatlock);
        commands.insert("ignoreobject", cmd_ignoreobject);
        commands.insert("unignoreobject", cmd_unignoreobject);
        commands.insert("clearignore", cmd_clearignore);
        commands.insert("clearjournal", cmd_clearjournal);
        commands.insert("setvar", cmd_setvar);
        commands.insert("unsetvar", cmd_unsetvar);

        let mut expressions: HashMap<&'static str, ExprFn> = HashMap::new();
        expressions.insert("findtype", expr_findtype);
        expressions.insert("findobject", expr_findobject);
        expressions.insert("injournal", expr_injournal);
        expressions.insert("targetexists", expr_targetexists);
        expressions.insert("gumpexists", expr_gumpexists);
        expressions.insert("distance", expr_distance);
        expressions.insert("varexists", expr_varexists);

        let mut aliases: HashMap<&'static str, AliasFn> = HashMap::new();
        aliases.insert("self", |session, _| session.world.player);
        aliases.insert("backpack", |session, _| session.world.backpack);
        aliases.insert("lasttarget", |session, _| session.last_target());
        aliases.insert("found", |_, run| run.last_found());

        Self {
            commands,
            expressions,
            aliases,
        }
    }

    pub fn command(&self, name: &str) -> Option<CommandFn> {
        self.commands.get(name).copied()
    }

    pub fn expression(&self, name: &str) -> Option<ExprFn> {
        self.expressions.get(name).copied()
    }

    pub fn alias(&self, name: &str) -> Option<AliasFn> {
        self.aliases.get(name).copied()
    }
}

// ===== Argument helpers =====

fn arg(args: &[Value], index: usize, what: &str) -> Result<Value, ScriptError> {
    args.get(index)
        .cloned()
        .ok_or_else(|| ScriptError::runtime(format!("missing argument: {what}")))
}

fn arg_str(args: &[Value], index: usize, what: &str) -> Result<String, ScriptError> {
    Ok(arg(args, index, what)?.display())
}

fn arg_int(args: &[Value], index: usize, what: &str) -> Result<i64, ScriptError> {
    arg(args, index, what)?
        .as_int()
        .ok_or_else(|| ScriptError::runtime(format!("{what} must be a number")))
}

fn arg_serial(args: &[Value], index: usize, what: &str) -> Result<Serial, ScriptError> {
    arg(args, index, what)?
        .as_serial()
        .ok_or_else(|| ScriptError::runtime(format!("{what} must be a serial")))
}

// ===== Commands =====

fn cmd_say(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    ctx.session.say(arg_str(args, 0, "text")?);
    Ok(())
}

fn cmd_emote(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    ctx.session.emote(arg_str(args, 0, "text")?);
    Ok(())
}

fn cmd_sysmsg(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    ctx.session.sys_message(arg_str(args, 0, "text")?);
    Ok(())
}

fn cmd_headmsg(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    let serial = arg_serial(args, 0, "target")?;
    ctx.session.head_message(serial, arg_str(args, 1, "text")?);
    Ok(())
}

fn cmd_useobject(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    ctx.session.use_item(arg_serial(args, 0, "target")?);
    Ok(())
}

fn cmd_moveitem(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    let item = arg_serial(args, 0, "item")?;
    let container = arg_serial(args, 1, "container")?;
    let amount = arg_int(args, 2, "amount").unwrap_or(1).clamp(1, u16::MAX as i64) as u16;
    ctx.session.move_item(item, container, amount);
    Ok(())
}

fn cmd_target(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    ctx.session.target(arg_serial(args, 0, "target")?);
    Ok(())
}

fn cmd_canceltarget(ctx: &mut CommandCtx, _args: &[Value]) -> Result<(), ScriptError> {
    ctx.session.cancel_target();
    Ok(())
}

fn cmd_replygump(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    let gump_id = arg_int(args, 0, "gump id")? as u32;
    let button = arg_int(args, 1, "button")? as u32;
    ctx.session.reply_gump(gump_id, button);
    Ok(())
}

fn cmd_pathfind(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    let x = arg_int(args, 0, "x")? as i32;
    let y = arg_int(args, 1, "y")? as i32;
    let z = arg_int(args, 2, "z").unwrap_or(0) as i32;
    ctx.session.pathfind_to(x, y, z);
    Ok(())
}

fn parse_lock(word: &str) -> Result<LockState, ScriptError> {
    match word.to_ascii_lowercase().as_str() {
        "up" => Ok(LockState::Up),
        "down" => Ok(LockState::Down),
        "locked" => Ok(LockState::Locked),
        other => Err(ScriptError::runtime(format!("unknown lock state '{other}'"))),
    }
}

fn cmd_setskilllock(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    let skill = arg_str(args, 0, "skill")?;
    let lock = parse_lock(&arg_str(args, 1, "lock state")?)?;
    ctx.session.set_skill_lock(&skill, lock);
    Ok(())
}

fn cmd_setstatlock(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    let stat = match arg_str(args, 0, "stat")?.to_ascii_lowercase().as_str() {
        "str" | "strength" => Stat::Strength,
        "dex" | "dexterity" => Stat::Dexterity,
        "int" | "intelligence" => Stat::Intelligence,
        other => return Err(ScriptError::runtime(format!("unknown stat '{other}'"))),
    };
    let lock = parse_lock(&arg_str(args, 1, "lock state")?)?;
    ctx.session.set_stat_lock(stat, lock);
    Ok(())
}

fn cmd_ignoreobject(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    ctx.run.ignore(arg_serial(args, 0, "target")?);
    Ok(())
}

fn cmd_unignoreobject(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    ctx.run.unignore(arg_serial(args, 0, "target")?);
    Ok(())
}

fn cmd_clearignore(ctx: &mut CommandCtx, _args: &[Value]) -> Result<(), ScriptError> {
    ctx.run.clear_ignore();
    Ok(())
}

fn cmd_clearjournal(ctx: &mut CommandCtx, _args: &[Value]) -> Result<(), ScriptError> {
    ctx.run.journal.clear();
    Ok(())
}

fn cmd_setvar(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    let name = arg_str(args, 0, "name")?;
    let value = arg_str(args, 1, "value")?;
    ctx.vars.set(name, value);
    Ok(())
}

fn cmd_unsetvar(ctx: &mut CommandCtx, args: &[Value]) -> Result<(), ScriptError> {
    ctx.vars.unset(&arg_str(args, 0, "name")?);
    Ok(())
}

// ===== Expressions =====

fn expr_findtype(ctx: &mut CommandCtx, args: &[Value]) -> Result<Value, ScriptError> {
    let graphic = arg_int(args, 0, "graphic")? as u16;
    let container = args.get(1).and_then(|v| v.as_serial());
    let ignore = ctx.run.ignore_snapshot();
    let found = ctx.session.find_type(graphic, container, &ignore);
    if found.is_valid() {
        ctx.run.set_last_found(found);
    }
    Ok(Value::Serial(found))
}

fn expr_findobject(ctx: &mut CommandCtx, args: &[Value]) -> Result<Value, ScriptError> {
    let serial = arg_serial(args, 0, "target")?;
    Ok(Value::Int(ctx.session.world.contains(serial) as i64))
}

fn expr_injournal(ctx: &mut CommandCtx, args: &[Value]) -> Result<Value, ScriptError> {
    let pattern = arg_str(args, 0, "pattern")?;
    let consume = args
        .get(1)
        .map(|v| v.display().eq_ignore_ascii_case("consume"))
        .unwrap_or(false);
    Ok(Value::Int(ctx.run.journal.search(&pattern, consume) as i64))
}

fn expr_targetexists(ctx: &mut CommandCtx, _args: &[Value]) -> Result<Value, ScriptError> {
    Ok(Value::Int(ctx.session.has_target_cursor() as i64))
}

fn expr_gumpexists(ctx: &mut CommandCtx, _args: &[Value]) -> Result<Value, ScriptError> {
    Ok(Value::Int(ctx.session.has_gump() as i64))
}

fn expr_distance(ctx: &mut CommandCtx, args: &[Value]) -> Result<Value, ScriptError> {
    let serial = arg_serial(args, 0, "target")?;
    let distance = ctx
        .session
        .world
        .distance_to(serial)
        .map(i64::from)
        .unwrap_or(-1);
    Ok(Value::Int(distance))
}

fn expr_varexists(ctx: &mut CommandCtx, args: &[Value]) -> Result<Value, ScriptError> {
    let name = arg_str(args, 0, "name")?;
    Ok(Value::Int(ctx.vars.contains(&name) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_tables_are_populated() {
        let registry = CoopRegistry::standard();
        assert!(registry.command("say").is_some());
        assert!(registry.command("frobnicate").is_none());
        assert!(registry.expression("findtype").is_some());
        assert!(registry.alias("backpack").is_some());
    }

    #[test]
    fn findtype_sets_last_found() {
        let (mut session, _sink) = GameSession::offline("Tester");
        let run = RunState::new(16);
        let vars = SharedVars::new();
        let backpack = session.world.backpack;

        let mut ctx = CommandCtx {
            session: &mut session,
            run: &run,
            vars: &vars,
        };
        // The offline backpack has graphic 0x0E75.
        let value = expr_findtype(&mut ctx, &[Value::Int(0x0E75)]).unwrap();
        assert_eq!(value, Value::Serial(backpack));
        assert_eq!(run.last_found(), backpack);
    }

    #[test]
    fn injournal_consume_marks_lines() {
        let (mut session, _sink) = GameSession::offline("Tester");
        let run = RunState::new(16);
        let vars = SharedVars::new();
        run.journal.push(moonglow_events::JournalEntry::system("poison wears off"));

        let mut ctx = CommandCtx {
            session: &mut session,
            run: &run,
            vars: &vars,
        };
        let hit = expr_injournal(
            &mut ctx,
            &[Value::Str("poison".into()), Value::Str("consume".into())],
        )
        .unwrap();
        assert_eq!(hit, Value::Int(1));

        let again = expr_injournal(&mut ctx, &[Value::Str("poison".into())]).unwrap();
        assert_eq!(again, Value::Int(0));
    }
}
