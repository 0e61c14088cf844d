//! `rolo`: command-line client for a Rolo server.
//!
//! # Usage
//!
//! ```text
//! rolo --url http://localhost:5232 list --search jo
//! rolo add --first-name Jo --last-name Li --email jo@x.com
//! rolo --config ~/.config/rolo/config.toml stats
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use rolo_cli::{
  cache::CacheStore,
  client::{ApiClient, ApiConfig},
  coordinator::ContactCoordinator,
  messages::{self, Operation},
  search::SearchController,
};
use rolo_core::{
  contact::{Contact, ContactId, ContactInput},
  query::{ContactPage, ContactQuery, DEFAULT_LIMIT},
};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rolo", about = "Command-line client for the Rolo contact server")]
struct Args {
  /// Path to a TOML config file (url, timeout_secs).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the rolo server (default: http://localhost:5232).
  #[arg(long, env = "ROLO_URL")]
  url: Option<String>,

  /// Request timeout in seconds (default: 30).
  #[arg(long, env = "ROLO_TIMEOUT")]
  timeout: Option<u64>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List contacts, optionally filtered.
  List {
    /// Match against first name, last name, email or company.
    #[arg(short, long)]
    search: Option<String>,
    #[arg(long, default_value_t = 0)]
    offset: u32,
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit:  u32,
  },
  /// Show one contact.
  Show { id: ContactId },
  /// Create a contact.
  Add(NewContact),
  /// Change some fields of a contact; omitted fields keep their value.
  Edit {
    id:     ContactId,
    #[command(flatten)]
    fields: ContactChanges,
  },
  /// Delete a contact.
  Rm { id: ContactId },
  /// Show aggregate counts.
  Stats,
}

#[derive(clap::Args, Debug)]
struct NewContact {
  #[arg(long)]
  first_name: String,
  #[arg(long)]
  last_name:  String,
  #[arg(long)]
  email:      String,
  #[arg(long)]
  phone:      Option<String>,
  #[arg(long)]
  company:    Option<String>,
}

impl From<NewContact> for ContactInput {
  fn from(new: NewContact) -> Self {
    Self {
      first_name: new.first_name,
      last_name:  new.last_name,
      email:      new.email,
      phone:      new.phone,
      company:    new.company,
    }
  }
}

#[derive(clap::Args, Debug)]
struct ContactChanges {
  #[arg(long)]
  first_name: Option<String>,
  #[arg(long)]
  last_name:  Option<String>,
  #[arg(long)]
  email:      Option<String>,
  /// Pass an empty string to clear.
  #[arg(long)]
  phone:      Option<String>,
  /// Pass an empty string to clear.
  #[arg(long)]
  company:    Option<String>,
}

impl ContactChanges {
  fn apply(self, current: Contact) -> ContactInput {
    ContactInput {
      first_name: self.first_name.unwrap_or(current.first_name),
      last_name:  self.last_name.unwrap_or(current.last_name),
      email:      self.email.unwrap_or(current.email),
      phone:      self.phone.or(current.phone),
      company:    self.company.or(current.company),
    }
  }
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:          Option<String>,
  #[serde(default)]
  timeout_secs: Option<u64>,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let defaults = ApiConfig::default();
  let api_config = ApiConfig {
    base_url: args.url.or(file_cfg.url).unwrap_or(defaults.base_url),
    timeout:  args
      .timeout
      .or(file_cfg.timeout_secs)
      .map(Duration::from_secs)
      .unwrap_or(defaults.timeout),
  };

  let client = ApiClient::new(api_config)?;
  let cache = CacheStore::shared();
  let coordinator = ContactCoordinator::new(Arc::new(client), cache);

  run(args.command, coordinator).await
}

async fn run(command: Command, coordinator: ContactCoordinator<ApiClient>) -> Result<()> {
  match command {
    Command::List { search, offset, limit } => {
      let coordinator = Arc::new(
        coordinator.with_default_query(ContactQuery::new(None, limit, 0)),
      );
      let controller = SearchController::new(coordinator);
      let page = controller
        .set_search_at(search.unwrap_or_default(), offset)
        .await
        .map_err(|e| failed(Operation::Fetch, e))?;
      print_page(&page, &controller.search(), offset);
    }

    Command::Show { id } => {
      let contact = coordinator
        .get(id)
        .await
        .map_err(|e| failed(Operation::Fetch, e))?;
      print_details(&contact);
    }

    Command::Add(new) => {
      let contact = coordinator
        .create(new.into())
        .await
        .map_err(|e| failed(Operation::Create, e))?;
      println!("{}", messages::created(&contact));
      print_details(&contact);
    }

    Command::Edit { id, fields } => {
      let current = coordinator
        .get(id)
        .await
        .map_err(|e| failed(Operation::Update, e))?;
      let contact = coordinator
        .update(id, fields.apply(current))
        .await
        .map_err(|e| failed(Operation::Update, e))?;
      println!("{}", messages::updated(&contact));
      print_details(&contact);
    }

    Command::Rm { id } => {
      coordinator
        .delete(id)
        .await
        .map_err(|e| failed(Operation::Delete, e))?;
      println!("{}", messages::DELETED);
    }

    Command::Stats => {
      let stats = coordinator
        .stats()
        .await
        .map_err(|e| failed(Operation::Fetch, e))?;
      println!("Total contacts:   {}", stats.total_contacts);
      println!(
        "With phone:       {} ({} without)",
        stats.contacts_with_phone, stats.contacts_without_phone
      );
      println!(
        "With company:     {} ({} without)",
        stats.contacts_with_company, stats.contacts_without_company
      );
    }
  }

  Ok(())
}

fn failed(op: Operation, error: rolo_core::Error) -> anyhow::Error {
  tracing::debug!(?op, %error, "command failed");
  anyhow!(messages::failure(op, &error))
}

// ─── Output ───────────────────────────────────────────────────────────────────

fn print_page(page: &ContactPage, search: &str, offset: u32) {
  if page.contacts.is_empty() {
    if search.trim().is_empty() {
      println!("{}", messages::NO_CONTACTS);
    } else {
      println!("{}", messages::empty_search(search.trim()));
    }
    return;
  }

  for contact in &page.contacts {
    println!(
      "{:>6}  {:<28} {:<32} {:<20} {}",
      contact.id,
      contact.full_name(),
      contact.email,
      contact.phone.as_deref().unwrap_or(messages::NO_PHONE),
      contact.company.as_deref().unwrap_or(messages::NO_COMPANY),
    );
  }

  let first = u64::from(offset) + 1;
  let last = u64::from(offset) + page.contacts.len() as u64;
  println!();
  println!("Showing {first}-{last} of {}", page.total_count);
}

fn print_details(contact: &Contact) {
  println!("Id:       {}", contact.id);
  println!("Name:     {}", contact.full_name());
  println!("Email:    {}", contact.email);
  println!(
    "Phone:    {}",
    contact.phone.as_deref().unwrap_or(messages::NO_PHONE)
  );
  println!(
    "Company:  {}",
    contact.company.as_deref().unwrap_or(messages::NO_COMPANY)
  );
  println!("Created:  {}", contact.created_at.format("%Y-%m-%d %H:%M"));
  println!("Updated:  {}", contact.updated_at.format("%Y-%m-%d %H:%M"));
}
