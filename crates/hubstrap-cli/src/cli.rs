//! Command-line interface definitions.

use clap::{ArgGroup, Args, Parser, Subcommand};
use hubstrap_hub::{CastId, MessageHash};
use hubstrap_types::Fid;
use std::path::PathBuf;

/// Funds an account across chains and bootstraps a social identity for it.
#[derive(Parser, Debug)]
#[command(name = "hubstrap")]
#[command(version)]
#[command(
	after_help = "Rate limits between posts, follows and profile updates apply within one invocation; separate invocations do not wait on each other."
)]
pub struct Cli {
	#[command(flatten)]
	pub global: GlobalArgs,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
	/// TOML file overlaid on the built-in mainnet defaults
	#[arg(short, long, global = true)]
	pub config: Option<PathBuf>,

	/// Custody account key. Falls back to the active stored identity
	#[arg(long, global = true, env = "HUBSTRAP_PRIVATE_KEY", hide_env_values = true)]
	pub private_key: Option<String>,

	/// Directory holding stored credentials
	#[arg(long, global = true, env = "HUBSTRAP_DATA_DIR", default_value = ".hubstrap")]
	pub data_dir: PathBuf,

	/// Print machine-readable JSON instead of text
	#[arg(long, global = true)]
	pub json: bool,

	/// Enable debug logging
	#[arg(long, global = true)]
	pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Show native and stablecoin balances on every configured chain
	Balances,

	/// Show the funding plan without executing it
	Plan,

	/// Plan and execute funding
	Fund,

	/// Register an identity for the account
	Register,

	/// Authorize a signer key, reusing the stored one while it is active
	Signer {
		/// Issue a new key even if the stored one is still active
		#[arg(long)]
		rotate: bool,
	},

	/// Wait for the hub to index the identity and signer
	Sync,

	/// Publish a post
	Cast(CastArgs),

	/// Remove a post by hash
	Uncast {
		#[arg(value_parser = parse_hash)]
		hash: MessageHash,
	},

	/// Follow an identity
	Follow {
		#[arg(value_parser = parse_fid)]
		fid: Fid,
	},

	/// Stop following an identity
	Unfollow {
		#[arg(value_parser = parse_fid)]
		fid: Fid,
	},

	/// Update profile fields
	Profile(ProfileArgs),

	/// Username operations
	Name(NameCommand),

	/// Fund, register, delegate and optionally claim a name and post, in one run
	Bootstrap(BootstrapArgs),

	/// Show the stored identity for the account
	Whoami,
}

impl Commands {
	/// Operation name used in logs and user messages.
	pub fn name(&self) -> &'static str {
		match self {
			Self::Balances => "balances",
			Self::Plan => "plan",
			Self::Fund => "fund",
			Self::Register => "register",
			Self::Signer { .. } => "signer",
			Self::Sync => "sync",
			Self::Cast(_) => "cast",
			Self::Uncast { .. } => "uncast",
			Self::Follow { .. } => "follow",
			Self::Unfollow { .. } => "unfollow",
			Self::Profile(_) => "profile",
			Self::Name(NameCommand {
				command: NameSubcommand::Check { .. },
			}) => "name check",
			Self::Name(NameCommand {
				command: NameSubcommand::Register { .. },
			}) => "name register",
			Self::Bootstrap(_) => "bootstrap",
			Self::Whoami => "whoami",
		}
	}
}

#[derive(Args, Debug)]
pub struct CastArgs {
	pub text: String,

	/// URL to embed, at most twice
	#[arg(long = "embed")]
	pub embeds: Vec<String>,

	/// Parent post as `<fid>:<hash>`
	#[arg(long, value_parser = parse_cast_id, conflicts_with = "channel")]
	pub reply_to: Option<CastId>,

	/// Channel URL to post into
	#[arg(long)]
	pub channel: Option<String>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("fields").required(true).multiple(true)))]
pub struct ProfileArgs {
	#[arg(long, group = "fields")]
	pub display: Option<String>,

	#[arg(long, group = "fields")]
	pub bio: Option<String>,

	/// Profile picture URL
	#[arg(long, group = "fields")]
	pub pfp: Option<String>,

	#[arg(long, group = "fields")]
	pub url: Option<String>,
}

#[derive(Args, Debug)]
pub struct NameCommand {
	#[command(subcommand)]
	pub command: NameSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum NameSubcommand {
	/// Check whether a username is free
	Check { name: String },

	/// Claim a username for the stored identity
	Register { name: String },
}

#[derive(Args, Debug)]
pub struct BootstrapArgs {
	/// Username to claim once the identity exists
	#[arg(long)]
	pub username: Option<String>,

	/// Skip planning and executing funding
	#[arg(long)]
	pub skip_funding: bool,

	/// Do not wait for the hub to index the new signer
	#[arg(long)]
	pub no_sync: bool,

	/// Text of a first post
	#[arg(long = "cast")]
	pub first_cast: Option<String>,
}

fn parse_fid(value: &str) -> Result<Fid, String> {
	Fid::parse(value).map_err(|e| e.to_string())
}

fn parse_hash(value: &str) -> Result<MessageHash, String> {
	value.parse().map_err(|e: hubstrap_types::ValidationError| e.to_string())
}

fn parse_cast_id(value: &str) -> Result<CastId, String> {
	let (fid, hash) = value
		.split_once(':')
		.ok_or_else(|| format!("expected <fid>:<hash>, got {value:?}"))?;
	Ok(CastId {
		fid: parse_fid(fid)?,
		hash: parse_hash(hash)?,
	})
}
