//! CLI command implementations
//!
//! Each invocation loads the config, opens the durable store under
//! `data_dir`, runs one membership operation and prints one JSON response.
//! Reads go straight to the store; a process lives for one command, so
//! the authority cache only serves as the change notifier here.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::membership::{
    Actor, FileRelationStore, GrantedAuthorityCache, MembershipRecord, MembershipService,
    ReconcileOutcome,
};
use crate::observability::FileAuditLog;

use super::args::{Command, CommonArgs};
use super::config::Config;
use super::errors::{CliError, CliResult};
use super::io::write_response;

const AUDIT_FILE: &str = "audit.log";

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run one command and print its result
pub fn run_command(cmd: Command) -> CliResult<()> {
    let data = execute(cmd)?;
    write_response(data)
}

/// Run one command, returning the `data` payload of the response
pub fn execute(cmd: Command) -> CliResult<Value> {
    let ctx = Context::open(cmd.common())?;

    match cmd {
        Command::Bootstrap { superuser, .. } => bootstrap(&ctx, superuser),
        Command::Grants { principal, .. } => grants(&ctx, &principal),
        Command::Members { authority, .. } => members(&ctx, &authority),
        Command::SetGrants {
            principal,
            authorities,
            ..
        } => set_grants(&ctx, &principal, &authorities),
        Command::SetMembers {
            authority,
            principals,
            ..
        } => set_members(&ctx, &authority, &principals),
        Command::Purge { principal, .. } => purge(&ctx, &principal),
    }
}

/// Everything one invocation needs
struct Context {
    config: Config,
    service: MembershipService,
    actor: Actor,
}

impl Context {
    fn open(common: &CommonArgs) -> CliResult<Self> {
        let config = Config::load(&common.config)?;

        let store = FileRelationStore::open(config.data_path())?;
        let audit_path = store
            .log_path()
            .parent()
            .map(|dir| dir.join(AUDIT_FILE))
            .ok_or_else(|| CliError::io_error("relation log has no parent directory"))?;

        let mut service = MembershipService::new(
            Arc::new(store),
            Arc::new(GrantedAuthorityCache::new()),
            config.to_membership_config(),
        )?;

        if config.audit_log {
            let audit = FileAuditLog::open(&audit_path).map_err(|e| {
                CliError::io_error(format!(
                    "Failed to open audit log {}: {}",
                    audit_path.display(),
                    e
                ))
            })?;
            service = service.with_audit_log(Arc::new(audit));
        }

        Ok(Self {
            config,
            service,
            actor: Actor::new(common.actor.as_str()),
        })
    }
}

fn bootstrap(ctx: &Context, superuser: Option<String>) -> CliResult<Value> {
    let superuser = superuser
        .or_else(|| ctx.config.superuser.clone())
        .ok_or_else(CliError::missing_superuser)?;

    let outcome = ctx.service.ensure_superuser_admin(&ctx.actor, &superuser)?;

    Ok(json!({
        "superuser": superuser,
        "authority": ctx.service.config().admin_authority,
        "stale_removed": principals_of(&outcome.stale_removed),
        "inserted": outcome.inserted.is_some(),
        "changed": outcome.changed(),
    }))
}

fn grants(ctx: &Context, principal: &str) -> CliResult<Value> {
    let authorities = ctx.service.granted_authorities(&ctx.actor, principal)?;

    Ok(json!({
        "principal": principal,
        "authorities": authorities,
    }))
}

fn members(ctx: &Context, authority: &str) -> CliResult<Value> {
    let principals = ctx.service.principals_with_authority(&ctx.actor, authority)?;

    Ok(json!({
        "authority": authority,
        "principals": principals,
    }))
}

fn set_grants(ctx: &Context, principal: &str, authorities: &[String]) -> CliResult<Value> {
    let outcome = ctx
        .service
        .reconcile_authorities_for_principal(&ctx.actor, principal, authorities)?;

    Ok(json!({
        "principal": principal,
        "granted": authorities_of(&outcome.inserted),
        "revoked": authorities_of(&outcome.deleted),
        "changed": outcome.changed(),
    }))
}

fn set_members(ctx: &Context, authority: &str, principals: &[String]) -> CliResult<Value> {
    let outcome: ReconcileOutcome = ctx
        .service
        .reconcile_principals_for_authority(&ctx.actor, authority, principals)?;

    Ok(json!({
        "authority": authority,
        "granted": principals_of(&outcome.inserted),
        "revoked": principals_of(&outcome.deleted),
        "changed": outcome.changed(),
    }))
}

fn purge(ctx: &Context, principal: &str) -> CliResult<Value> {
    let removed = ctx.service.delete_all_for_principal(&ctx.actor, principal)?;

    Ok(json!({
        "principal": principal,
        "removed": authorities_of(&removed),
    }))
}

fn principals_of(records: &[MembershipRecord]) -> BTreeSet<&str> {
    records.iter().map(|r| r.principal()).collect()
}

fn authorities_of(records: &[MembershipRecord]) -> BTreeSet<&str> {
    records.iter().map(|r| r.authority()).collect()
}
