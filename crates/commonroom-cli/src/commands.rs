use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};

use commonroom_core::{ApiClient, ResourceUpload};

#[derive(Debug, Parser)]
#[command(name = "commonroom", version, about = "Command line client for the Commonroom API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an account and store the returned session
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign in and store the returned session
    Login {
        #[arg(long)]
        email: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the stored session
    Status,
    /// Show the signed-in user
    Me,
    /// Show a user by id
    User { id: String },
    /// Search users by name or email
    SearchUsers { query: String },
    /// Update profile fields, given as key=value
    UpdateProfile {
        #[arg(required = true, value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },
    /// Change the account password (prompts for both passwords)
    ChangePassword,
    /// Shared resources
    #[command(subcommand)]
    Resources(ResourceCommand),
    /// List categories, or show one by slug
    Categories { slug: Option<String> },
    /// Direct messages
    #[command(subcommand)]
    Messages(MessageCommand),
    /// Anonymous message board
    #[command(subcommand)]
    Anon(AnonCommand),
}

#[derive(Debug, Subcommand)]
pub enum ResourceCommand {
    /// List resources, filtered by key=value query parameters
    List {
        #[arg(value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
    Get { id: String },
    Create(CreateResource),
    /// Update fields of a resource, given as key=value
    Update {
        id: String,
        #[arg(required = true, value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },
    Delete { id: String },
}

#[derive(Debug, Args)]
pub struct CreateResource {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub category: Option<String>,
    /// Files to attach
    #[arg(long = "file")]
    pub files: Vec<PathBuf>,
    /// Extra form fields
    #[arg(long = "field", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum MessageCommand {
    Send {
        /// Recipient user id
        #[arg(long)]
        to: String,
        content: String,
    },
    History { user1: String, user2: String },
    Unseen { user: String },
    /// Mark a message as seen
    Seen { id: String },
}

#[derive(Debug, Subcommand)]
pub enum AnonCommand {
    List,
    Send { content: String },
}

pub async fn run(client: &ApiClient, command: Command) -> Result<()> {
    let output = match command {
        Command::Register {
            name,
            email,
            password,
        } => {
            let password = password_or_prompt(password, "Password: ")?;
            client
                .sign_up(&json!({ "name": name, "email": email, "password": password }))
                .await?
        }
        Command::Login { email, password } => {
            let password = password_or_prompt(password, "Password: ")?;
            client
                .sign_in(&json!({ "email": email, "password": password }))
                .await?
        }
        Command::Logout => {
            client.sign_out()?;
            eprintln!("Signed out.");
            return Ok(());
        }
        Command::Status => {
            print_status(client)?;
            return Ok(());
        }
        Command::Me => client.get_current_user().await?,
        Command::User { id } => client.get_user_by_id(&id).await.unwrap_or(Value::Null),
        Command::SearchUsers { query } => client.search_users(&query).await?,
        Command::UpdateProfile { fields } => {
            client.update_profile(&parse_fields(&fields)?).await?
        }
        Command::ChangePassword => {
            let current = rpassword::prompt_password("Current password: ")?;
            let new = rpassword::prompt_password("New password: ")?;
            client
                .change_password(&json!({ "currentPassword": current, "newPassword": new }))
                .await?
        }
        Command::Resources(cmd) => run_resources(client, cmd).await?,
        Command::Categories { slug } => match slug {
            Some(slug) => client.get_category_by_slug(&slug).await?,
            None => client.get_categories().await?,
        },
        Command::Messages(cmd) => match cmd {
            MessageCommand::Send { to, content } => {
                client
                    .send_message(&json!({ "receiverId": to, "content": content }))
                    .await?
            }
            MessageCommand::History { user1, user2 } => {
                client.get_chat_history(&user1, &user2).await?
            }
            MessageCommand::Unseen { user } => client.get_unseen_messages(&user).await?,
            MessageCommand::Seen { id } => client.mark_message_as_seen(&id).await?,
        },
        Command::Anon(cmd) => match cmd {
            AnonCommand::List => client.get_anonymous_messages().await?,
            AnonCommand::Send { content } => {
                client
                    .send_anonymous_message(&json!({ "content": content }))
                    .await?
            }
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_resources(client: &ApiClient, command: ResourceCommand) -> Result<Value> {
    match command {
        ResourceCommand::List { params } => {
            let pairs = split_pairs(&params)?;
            client.get_resources(&pairs).await
        }
        ResourceCommand::Get { id } => client.get_resource_by_id(&id).await,
        ResourceCommand::Create(args) => client.create_resource(build_upload(args)?).await,
        ResourceCommand::Update { id, fields } => {
            client.update_resource(&id, &parse_fields(&fields)?).await
        }
        ResourceCommand::Delete { id } => client.delete_resource(&id).await,
    }
}

fn build_upload(args: CreateResource) -> Result<ResourceUpload> {
    let mut upload = ResourceUpload::new().text("title", args.title);
    if let Some(description) = args.description {
        upload = upload.text("description", description);
    }
    if let Some(category) = args.category {
        upload = upload.text("category", category);
    }
    for (key, value) in split_pairs(&args.fields)? {
        upload = upload.text(key, value);
    }
    for path in &args.files {
        upload = upload.file_from_path("file", path)?;
    }
    Ok(upload)
}

fn print_status(client: &ApiClient) -> Result<()> {
    match client.session().load()? {
        Some(record) if record.bearer_token().is_some() => {
            let who = record.display_name().unwrap_or_else(|| "unknown user".to_string());
            let when = record
                .saved_at
                .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("Signed in as {} ({}, stored {})", who, record.age_display(), when);
        }
        _ => println!("Not signed in ({})", client.base_url()),
    }
    Ok(())
}

fn password_or_prompt(password: Option<String>, prompt: &str) -> Result<String> {
    match password {
        Some(p) => Ok(p),
        None => rpassword::prompt_password(prompt).context("Failed to read password"),
    }
}

/// Split `key=value` arguments, keeping the value verbatim.
fn split_pairs(args: &[String]) -> Result<Vec<(String, String)>> {
    args.iter()
        .map(|arg| {
            let (key, value) = arg
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Expected KEY=VALUE, got {:?}", arg))?;
            if key.is_empty() {
                return Err(anyhow::anyhow!("Empty key in {:?}", arg));
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Build a JSON object from `key=value` arguments. Values that parse as
/// JSON (numbers, booleans, arrays) keep their type; the rest are strings.
fn parse_fields(args: &[String]) -> Result<Map<String, Value>> {
    Ok(split_pairs(args)?
        .into_iter()
        .map(|(key, raw)| {
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            (key, value)
        })
        .collect())
}
