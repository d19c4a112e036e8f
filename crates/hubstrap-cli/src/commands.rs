//! Command handlers.

use anyhow::{anyhow, bail, Result};
use hubstrap_core::{BootstrapOptions, BootstrapReport, Stage};
use hubstrap_funding::{ExecutionReport, StepStatus};
use hubstrap_hub::{CastDraft, Submission, UserDataKind, Verification};
use hubstrap_identity::{Delegation, Registration};
use hubstrap_types::{format_units, BalanceSnapshot, FundingStrategy, SignerKeyPair};
use serde_json::json;

use crate::cli::{
	BootstrapArgs, CastArgs, Cli, Commands, NameCommand, NameSubcommand, ProfileArgs,
};
use crate::logging::{operation_success, operation_warning};
use crate::output::{print_json, Display};
use crate::session::Session;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let session = Session::open(&cli.global).await?;
	match cli.command {
		Commands::Balances => balances(&session).await,
		Commands::Plan => plan(&session).await,
		Commands::Fund => fund(&session).await,
		Commands::Register => register(session).await,
		Commands::Signer { rotate } => signer(session, rotate).await,
		Commands::Sync => sync(&session).await,
		Commands::Cast(args) => cast(&session, args).await,
		Commands::Uncast { hash } => {
			let submitter = session.submitter()?;
			let mut limiter = session.context.rate_limits.clone();
			let removal = submitter.remove_cast(&mut limiter, hash).await?;
			report_message(&session, "uncast", removal)
		},
		Commands::Follow { fid } => {
			let submitter = session.submitter()?;
			let mut limiter = session.context.rate_limits.clone();
			let hash = submitter.follow(&mut limiter, fid).await?;
			report_message(&session, "follow", hash)
		},
		Commands::Unfollow { fid } => {
			let submitter = session.submitter()?;
			let mut limiter = session.context.rate_limits.clone();
			let hash = submitter.unfollow(&mut limiter, fid).await?;
			report_message(&session, "unfollow", hash)
		},
		Commands::Profile(args) => profile(&session, args).await,
		Commands::Name(cmd) => name(session, cmd).await,
		Commands::Bootstrap(args) => bootstrap(session, args).await,
		Commands::Whoami => whoami(&session),
	}
}

async fn read_snapshot(session: &Session) -> BalanceSnapshot {
	let snapshot = session.context.reader.read_balances(session.owner()).await;
	for (chain_id, error) in &snapshot.errors {
		operation_warning("balances", &format!("chain {chain_id} unavailable: {error}"), error);
	}
	snapshot
}

async fn balances(session: &Session) -> Result<()> {
	let snapshot = read_snapshot(session).await;
	if session.json {
		return print_json(&snapshot);
	}

	Display::header(&format!("Balances of {}", session.owner()));
	for chain in session.context.registry.iter() {
		let balance = snapshot.get(chain.id);
		Display::kv(
			&format!("{} ({})", chain.name, chain.id),
			&format!(
				"{} {}, {} {}",
				format_units(balance.native, 18),
				chain.native_symbol,
				format_units(balance.stable, chain.stablecoin.decimals),
				chain.stablecoin.name,
			),
		);
	}
	Ok(())
}

fn show_strategy(strategy: &FundingStrategy) {
	Display::header("Funding plan");
	Display::kv("Rule", &format!("{:?}", strategy.rule));
	if let Some(insufficiency) = &strategy.insufficiency {
		Display::warning(&format!("Insufficient funds: {insufficiency}"));
		return;
	}
	if strategy.ready {
		Display::success("Both targets already met");
		return;
	}
	for (i, step) in strategy.steps.iter().enumerate() {
		println!("  {}. {}", i + 1, step);
	}
}

async fn plan(session: &Session) -> Result<()> {
	let snapshot = read_snapshot(session).await;
	let strategy = session.context.planner.plan(&snapshot);
	if session.json {
		return print_json(&json!({ "balances": snapshot, "strategy": strategy }));
	}
	show_strategy(&strategy);
	Ok(())
}

fn show_execution(execution: &ExecutionReport) {
	Display::section("Execution");
	for outcome in &execution.outcomes {
		match &outcome.status {
			StepStatus::Succeeded => Display::success(&outcome.to_string()),
			StepStatus::Pending => Display::warning(&outcome.to_string()),
			StepStatus::Failed { .. } => Display::error(&outcome.to_string()),
		}
		if let Some(tx_hash) = outcome.tx_hash {
			Display::kv("tx", &tx_hash.to_string());
		}
	}
}

async fn fund(session: &Session) -> Result<()> {
	let snapshot = read_snapshot(session).await;
	let strategy = session.context.planner.plan(&snapshot);
	if let Some(insufficiency) = &strategy.insufficiency {
		if session.json {
			print_json(&strategy)?;
		}
		bail!("insufficient funds: {insufficiency}");
	}
	if strategy.ready {
		if session.json {
			return print_json(&strategy);
		}
		Display::success("Account already funded");
		return Ok(());
	}

	let execution = session.context.router.execute(&strategy).await?;
	if session.json {
		print_json(&json!({ "strategy": strategy, "execution": execution }))?;
	} else {
		show_strategy(&strategy);
		show_execution(&execution);
	}

	if let Some(failed) = execution.failure() {
		bail!("{failed}");
	}
	if execution.is_pending() {
		operation_warning(
			"fund",
			"Bridge deposit has not landed yet; run `hubstrap fund` again once it arrives",
			&format!("{} of {} steps attempted", execution.outcomes.len(), execution.planned_steps),
		);
		return Ok(());
	}
	operation_success("fund", &format!("{} steps", execution.outcomes.len()));
	Ok(())
}

async fn register(mut session: Session) -> Result<()> {
	let registration = session.context.registrar.register().await?;
	let identity = registration.identity();
	session.update_record(identity.fid, |_| {}).await?;

	if session.json {
		return print_json(&json!({
			"fid": identity.fid,
			"owner": identity.owner,
			"newly_registered": registration.is_new(),
		}));
	}
	match registration {
		Registration::Registered { tx_hash, price, .. } => {
			Display::kv("Price", &format!("{} ETH", format_units(price, 18)));
			Display::kv("Transaction", &tx_hash.to_string());
			operation_success("register", &format!("fid {}", identity.fid));
		},
		Registration::AlreadyRegistered(_) => {
			Display::info(&format!("{} already owns fid {}", identity.owner, identity.fid));
		},
	}
	Ok(())
}

async fn signer(mut session: Session, rotate: bool) -> Result<()> {
	let existing = if rotate {
		None
	} else {
		session.stored_signer().map(|signer| signer.public_key)
	};
	let delegation = session.context.issuer.ensure(existing).await?;
	let identity = delegation.identity();
	let public_key = delegation.public_key();

	let issued = match delegation {
		Delegation::Issued(issued) => {
			let SignerKeyPair {
				public_key,
				private_key,
			} = issued.key_pair;
			session
				.update_record(identity.fid, |record| record.set_signer(public_key, private_key))
				.await?;
			Some(issued.tx_hash)
		},
		Delegation::AlreadyDelegated { .. } => None,
	};

	if session.json {
		return print_json(&json!({
			"fid": identity.fid,
			"public_key": public_key,
			"newly_issued": issued.is_some(),
			"tx_hash": issued,
		}));
	}
	Display::kv("Signer", &public_key.to_string());
	match issued {
		Some(tx_hash) => {
			Display::kv("Transaction", &tx_hash.to_string());
			operation_success("signer", &format!("fid {}", identity.fid));
		},
		None => Display::info("Stored signer is still active"),
	}
	Ok(())
}

async fn sync(session: &Session) -> Result<()> {
	let identity = session.identity()?;
	let signer = session
		.stored_signer()
		.ok_or_else(|| anyhow!("no stored signer for fid {}", identity.fid))?;
	let outcome = session
		.context
		.sync_waiter()
		.wait_for_sync(&identity, &signer.public_key)
		.await;

	if session.json {
		return print_json(&outcome);
	}
	if outcome.is_synced() {
		operation_success("sync", &format!("fid {}", identity.fid));
	} else {
		operation_warning(
			"sync",
			"Hub has not indexed the signer yet; later requests may still succeed",
			&format!("{outcome:?}"),
		);
	}
	Ok(())
}

fn show_submission(submission: &Submission) {
	Display::kv("Hash", &submission.hash.to_string());
	match &submission.verification {
		Verification::Verified => Display::success("Visible on the hub"),
		Verification::Unverified { reason } => {
			Display::warning(&format!("Not visible yet: {reason}"));
		},
	}
}

async fn cast(session: &Session, args: CastArgs) -> Result<()> {
	let mut draft = CastDraft::new(args.text);
	for embed in args.embeds {
		draft = draft.with_embed(embed);
	}
	if let Some(parent) = args.reply_to {
		draft = draft.reply_to(parent);
	}
	if let Some(channel) = args.channel {
		draft = draft.in_channel(channel);
	}

	let submitter = session.submitter()?;
	let mut limiter = session.context.rate_limits.clone();
	let submission = submitter.post(&mut limiter, draft).await?;

	if session.json {
		return print_json(&submission);
	}
	show_submission(&submission);
	operation_success("cast", &submission.hash.to_string());
	Ok(())
}

fn report_message(session: &Session, operation: &str, hash: hubstrap_hub::MessageHash) -> Result<()> {
	if session.json {
		return print_json(&json!({ "hash": hash }));
	}
	Display::kv("Hash", &hash.to_string());
	operation_success(operation, &hash.to_string());
	Ok(())
}

async fn profile(session: &Session, args: ProfileArgs) -> Result<()> {
	let fields = [
		(UserDataKind::Display, args.display),
		(UserDataKind::Bio, args.bio),
		(UserDataKind::Pfp, args.pfp),
		(UserDataKind::Url, args.url),
	];
	let submitter = session.submitter()?;
	let mut limiter = session.context.rate_limits.clone();

	let mut updated = serde_json::Map::new();
	for (kind, value) in fields {
		let Some(value) = value else { continue };
		let hash = submitter.set_user_data(&mut limiter, kind, value).await?;
		if !session.json {
			Display::kv(&kind.to_string(), &hash.to_string());
		}
		updated.insert(kind.to_string(), json!(hash));
	}

	if session.json {
		return print_json(&updated);
	}
	operation_success("profile", &format!("{} fields", updated.len()));
	Ok(())
}

async fn name(mut session: Session, cmd: NameCommand) -> Result<()> {
	match cmd.command {
		NameSubcommand::Check { name } => {
			let available = session.context.names.check_availability(&name).await?;
			if session.json {
				return print_json(&json!({ "name": name, "available": available }));
			}
			if available {
				Display::success(&format!("{name} is available"));
			} else {
				Display::warning(&format!("{name} is taken"));
			}
		},
		NameSubcommand::Register { name } => {
			let fid = session.require_record()?.fid;
			let submitter = session.submitter()?;
			let record = session
				.context
				.names
				.register_name(session.context.account.as_ref(), fid, &name)
				.await?;
			session
				.update_record(fid, |stored| stored.set_username(record.name.clone()))
				.await?;

			let mut limiter = session.context.rate_limits.clone();
			submitter
				.set_user_data(&mut limiter, UserDataKind::Username, record.name.clone())
				.await?;

			if session.json {
				return print_json(&record);
			}
			operation_success("name register", &format!("{} -> fid {}", record.name, record.fid));
		},
	}
	Ok(())
}

async fn bootstrap(session: Session, args: BootstrapArgs) -> Result<()> {
	let options = BootstrapOptions {
		existing_signer: session.stored_signer(),
		username: args.username,
		skip_funding: args.skip_funding,
		wait_for_sync: !args.no_sync,
		first_cast: args.first_cast.map(CastDraft::new),
	};

	let (mut session, report) = session.bootstrap(options).await;
	persist(&mut session, &report).await?;

	if session.json {
		print_json(&report)?;
	} else {
		show_report(&report);
	}

	match &report.failure {
		Some(failure) => Err(anyhow!("{failure}")),
		None => {
			operation_success("bootstrap", &format!("owner {}", report.owner));
			Ok(())
		},
	}
}

/// Stores whatever identity, signer and name the run produced, even when a
/// later stage failed.
async fn persist(session: &mut Session, report: &BootstrapReport) -> Result<()> {
	let Some(identity) = &report.identity else {
		return Ok(());
	};
	let signer = report
		.signer
		.as_ref()
		.filter(|signer| signer.newly_issued)
		.map(|signer| signer.key_pair.clone());
	let username = report.username.as_ref().map(|record| record.name.clone());

	session
		.update_record(identity.fid, |record| {
			if let Some(key_pair) = signer {
				record.set_signer(key_pair.public_key, key_pair.private_key);
			}
			if let Some(name) = username {
				record.set_username(name);
			}
		})
		.await
}

fn show_report(report: &BootstrapReport) {
	Display::header(&format!("Bootstrap of {}", report.owner));

	if let Some(strategy) = &report.strategy {
		Display::kv("Funding rule", &format!("{:?}", strategy.rule));
	}
	if let Some(execution) = &report.funding {
		show_execution(execution);
	}
	if let Some(identity) = &report.identity {
		let state = if identity.newly_registered { "registered" } else { "existing" };
		Display::kv("Identity", &format!("fid {} ({state})", identity.fid));
	}
	if let Some(signer) = &report.signer {
		let state = if signer.newly_issued { "issued" } else { "reused" };
		Display::kv("Signer", &format!("{} ({state})", signer.public_key));
	}
	if let Some(name) = &report.username {
		Display::kv("Username", &name.name);
	}
	if let Some(sync) = &report.sync {
		Display::kv("Hub sync", &format!("{sync:?}"));
	}
	if let Some(cast) = &report.cast {
		show_submission(cast);
	}
	if let Some(failure) = &report.failure {
		Display::error(&failure.to_string());
		let pending = report.funding.as_ref().is_some_and(|f| f.is_pending());
		if failure.stage == Stage::Funding && pending {
			Display::next_steps(&["Wait for the bridge fill", "Run `hubstrap bootstrap` again"]);
		}
	}
}

fn whoami(session: &Session) -> Result<()> {
	let record = session.record.as_ref();
	if session.json {
		return print_json(&json!({
			"owner": session.owner(),
			"fid": record.map(|r| r.fid),
			"signer": record.and_then(|r| r.signer_public_key),
			"username": record.and_then(|r| r.username.clone()),
		}));
	}

	Display::header("Account");
	Display::kv("Owner", &session.owner().to_string());
	match record {
		Some(record) => {
			Display::kv("Fid", &record.fid.to_string());
			if let Some(public_key) = &record.signer_public_key {
				Display::kv("Signer", &public_key.to_string());
			}
			if let Some(username) = &record.username {
				Display::kv("Username", username);
			}
			Display::kv("Updated", &record.updated_at.to_rfc3339());
		},
		None => Display::info("No stored identity"),
	}
	Ok(())
}
