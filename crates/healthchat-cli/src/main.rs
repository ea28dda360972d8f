use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use healthchat_core::api::ApiClient;
use healthchat_core::config::{HealthchatConfig, VALID_MODELS};
use healthchat_core::error::HealthchatError;
use healthchat_core::model::*;
use healthchat_core::session::{
    AuthStore, FileTokenStore, MemoryTokenStore, TokenStorage, TokenStore, REFRESH_TOKEN_KEY,
    TOKEN_KEY,
};
use healthchat_core::startup::hydrate_session;
use owo_colors::OwoColorize;

#[derive(Parser)]
#[command(
    name = "healthchat",
    about = "HealthChat: chat with clinical AI models from the terminal",
    version
)]
enum Cli {
    /// Write a project config in .healthchat/
    Init {
        /// Upstream API base URL the proxy forwards to
        #[arg(long)]
        upstream: Option<String>,
        /// Local proxy URL the client talks to
        #[arg(long)]
        proxy_url: Option<String>,
    },
    /// Show where you are and what to do next
    Home,
    /// Create an account
    Signup {
        #[arg(short, long)]
        email: String,
        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Sign in and store the session
    Signin {
        #[arg(short, long)]
        email: String,
        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// End the session on the server and forget it locally
    Logout,
    /// Show your profile
    Dashboard {
        #[arg(long)]
        json: bool,
    },
    /// Manage your profile
    Profile {
        #[command(subcommand)]
        action: ProfileCommand,
    },
    /// Work with chats
    Chat {
        #[command(subcommand)]
        action: ChatCommand,
    },
    /// Show session state in memory and on disk
    Debug {
        /// Remove the stored session
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Update name and/or subscription status
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        subscription_status: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ChatCommand {
    /// List your chats
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show a chat's messages
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Start a new chat with a first message
    New {
        message: String,
        /// Chartwright, TranscriptX, Redactify or Validify (default from config)
        #[arg(short, long)]
        model: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Send a message to an existing chat
    Send {
        id: i64,
        message: String,
        #[arg(short, long)]
        model: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Rename a chat
    Rename { id: i64, title: String },
    /// Delete a chat
    Delete {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = HealthchatConfig::load(Some(&std::env::current_dir()?))
        .unwrap_or_else(|e| {
            tracing::warn!("failed to load config, using defaults: {e}");
            HealthchatConfig::default_config()
        });

    let result = run(cli, &config).await;
    if let Err(ref err) = result {
        eprintln!("{} {}", "Error:".red(), err);
        if let Some(hint) = hint_for(err) {
            eprintln!("  {}", hint.dimmed());
        }
        std::process::exit(1);
    }
    result
}

async fn run(cli: Cli, config: &HealthchatConfig) -> Result<()> {
    let client = make_client(config)?;
    match cli {
        Cli::Init {
            upstream,
            proxy_url,
        } => cmd_init(upstream, proxy_url),
        Cli::Home => cmd_home(&client).await,
        Cli::Signup {
            email,
            password,
            json,
        } => {
            let password = password_or_stdin(password)?;
            cmd_signup(&client, SignUpRequest { email, password }, json).await
        }
        Cli::Signin {
            email,
            password,
            json,
        } => {
            let password = password_or_stdin(password)?;
            cmd_signin(&client, SignInRequest { email, password }, json).await
        }
        Cli::Logout => cmd_logout(&client).await,
        Cli::Dashboard { json } => cmd_dashboard(&client, json).await,
        Cli::Profile {
            action:
                ProfileCommand::Update {
                    name,
                    subscription_status,
                    json,
                },
        } => {
            let request = UpdateUserProfileRequest {
                name,
                subscription_status,
            };
            cmd_profile_update(&client, &request, json).await
        }
        Cli::Chat { action } => {
            require_auth(&client)?;
            match action {
                ChatCommand::List { json } => cmd_chat_list(&client, json).await,
                ChatCommand::Show { id, json } => cmd_chat_show(&client, id, json).await,
                ChatCommand::New {
                    message,
                    model,
                    json,
                } => {
                    let model = resolve_model(model, config)?;
                    cmd_chat_new(&client, &model, &message, json).await
                }
                ChatCommand::Send {
                    id,
                    message,
                    model,
                    json,
                } => {
                    let model = resolve_model(model, config)?;
                    cmd_chat_send(&client, id, &model, &message, json).await
                }
                ChatCommand::Rename { id, title } => cmd_chat_rename(&client, id, &title).await,
                ChatCommand::Delete { id, yes } => cmd_chat_delete(&client, id, yes).await,
            }
        }
        Cli::Debug { clear } => cmd_debug(&client, clear),
    }
}

/// Build the client over a file-backed session and restore any stored tokens.
fn make_client(config: &HealthchatConfig) -> Result<ApiClient> {
    let storage = match config.session_path() {
        Some(path) => TokenStorage::File(FileTokenStore::new(path)),
        None => {
            tracing::warn!("no config directory found, session will not persist");
            TokenStorage::Memory(MemoryTokenStore::new())
        }
    };
    let auth = Arc::new(AuthStore::new(storage));
    hydrate_session(&auth);
    ApiClient::from_config(&config.client, auth).context("failed to create API client")
}

fn require_auth(client: &ApiClient) -> Result<()> {
    if client.auth().is_authenticated() {
        Ok(())
    } else {
        Err(HealthchatError::Unauthenticated.into())
    }
}

fn resolve_model(model: Option<String>, config: &HealthchatConfig) -> Result<String> {
    let model = model.unwrap_or_else(|| config.client.default_model.clone());
    if !VALID_MODELS.contains(&model.as_str()) {
        anyhow::bail!(
            "unknown model '{}'. Valid options: {}",
            model,
            VALID_MODELS.join(", ")
        );
    }
    Ok(model)
}

fn password_or_stdin(password: Option<String>) -> Result<String> {
    if let Some(p) = password {
        return Ok(p);
    }
    eprint!("Password: ");
    std::io::stderr().flush()?;
    let line = read_line()?;
    if line.is_empty() {
        anyhow::bail!("password is required");
    }
    Ok(line)
}

fn read_line() -> Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn hint_for(err: &anyhow::Error) -> Option<&'static str> {
    let err = err.downcast_ref::<HealthchatError>()?;
    if err.is_auth_failure() {
        Some("Run `healthchat signin` to start a session.")
    } else if matches!(err, HealthchatError::Http(_)) {
        Some("Is the proxy running? Start it with `healthchat-web`.")
    } else {
        None
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// -- Init --

fn cmd_init(upstream: Option<String>, proxy_url: Option<String>) -> Result<()> {
    let cwd = std::env::current_dir()?;
    if cwd.join(".healthchat").join("config.toml").exists() {
        println!("HealthChat already initialized in this project.");
        return Ok(());
    }

    let mut config = HealthchatConfig::default_config();
    if let Some(url) = upstream {
        config.upstream.base_url = url;
    }
    if let Some(url) = proxy_url {
        config.client.proxy_url = url;
    }
    for warning in config.validate() {
        println!("{} {}", "Warning:".yellow(), warning);
    }
    let path = config.write_project_config(&cwd)?;

    let gitignore_path = cwd.join(".gitignore");
    let entry = ".healthchat/config.local.toml";
    if gitignore_path.exists() {
        let contents = std::fs::read_to_string(&gitignore_path)?;
        if !contents.lines().any(|l| l.trim() == entry) {
            let mut appended = contents;
            if !appended.ends_with('\n') {
                appended.push('\n');
            }
            appended.push_str(entry);
            appended.push('\n');
            std::fs::write(&gitignore_path, appended)?;
        }
    } else {
        std::fs::write(&gitignore_path, format!("{entry}\n"))?;
    }

    println!("{}", "Initialized HealthChat in .healthchat/".green());
    println!("  {}   {}", "Config:".dimmed(), path.display());
    println!("  {} {}", "Upstream:".dimmed(), config.upstream.base_url.cyan());
    println!("  {}    {}", "Proxy:".dimmed(), config.client.proxy_url.cyan());
    println!(
        "  {}",
        "Edit .healthchat/config.local.toml for local overrides (gitignored)".dimmed()
    );
    Ok(())
}

// -- Home / auth --

async fn cmd_home(client: &ApiClient) -> Result<()> {
    if client.auth().is_authenticated() {
        return cmd_dashboard(client, false).await;
    }
    println!("{}", "Welcome to HealthChat".bold());
    println!();
    println!("  {}  {}", "Sign in:".dimmed(), "healthchat signin -e <email>".cyan());
    println!("  {}  {}", "Sign up:".dimmed(), "healthchat signup -e <email>".cyan());
    Ok(())
}

async fn cmd_signup(client: &ApiClient, request: SignUpRequest, json: bool) -> Result<()> {
    let response = client.sign_up(&request).await?;
    if json {
        return print_json(&response);
    }
    if response.has_token() {
        println!("{} Signed up and signed in as {}", "✓".green(), request.email.cyan());
    } else {
        println!("{} Account created for {}", "✓".green(), request.email.cyan());
        if let Some(message) = response.message.as_deref() {
            println!("  {}", message.dimmed());
        }
        println!("  Next: {}", "healthchat signin".cyan());
    }
    Ok(())
}

async fn cmd_signin(client: &ApiClient, request: SignInRequest, json: bool) -> Result<()> {
    let response = client.sign_in(&request).await?;
    if json {
        return print_json(&response);
    }
    if !client.auth().is_authenticated() {
        anyhow::bail!("sign-in response carried no access token");
    }
    println!("{} Signed in as {}", "✓".green(), request.email.cyan());
    println!("  Next: {}", "healthchat dashboard".cyan());
    Ok(())
}

async fn cmd_logout(client: &ApiClient) -> Result<()> {
    if !client.auth().is_authenticated() {
        println!("{}", "Not signed in.".dimmed());
        return Ok(());
    }
    // The local session is gone either way; a failed server call is only reported.
    match client.logout().await {
        Ok(()) => println!("{} Signed out", "✓".green()),
        Err(e) => {
            println!("{} Signed out locally", "✓".green());
            eprintln!("  {} {}", "Server logout failed:".yellow(), e);
        }
    }
    Ok(())
}

// -- Profile --

async fn cmd_dashboard(client: &ApiClient, json: bool) -> Result<()> {
    require_auth(client)?;
    let profile = client.get_user_profile().await?;
    if json {
        return print_json(&profile);
    }
    print_profile(&profile);
    Ok(())
}

fn print_profile(profile: &UserProfile) {
    println!("{} {}!", "Welcome back,".bold(), profile.display_name().bold());
    println!();
    println!("{}", "--- Profile ---".dimmed());
    println!("  {}          {}", "Name:".dimmed(), profile.name.as_deref().unwrap_or("-"));
    let status = if profile.is_expired {
        profile.subscription_status.red().to_string()
    } else {
        profile.subscription_status.green().to_string()
    };
    println!("  {}  {}", "Subscription:".dimmed(), status);
    if let Some(ref started) = profile.subscription_started_on {
        println!("  {}       {}", "Started:".dimmed(), format_timestamp(started));
    }
    if let Some(ref expires) = profile.subscription_expires_on {
        println!("  {}       {}", "Expires:".dimmed(), format_timestamp(expires));
    }
    println!(
        "  {}       {}",
        "Account:".dimmed(),
        if profile.is_individual {
            "individual".to_string()
        } else {
            format!("team ({} members)", profile.number_of_allowed_members)
        }
    );
    let verified = if profile.is_verified {
        "yes".green().to_string()
    } else {
        "no".yellow().to_string()
    };
    println!("  {}      {}", "Verified:".dimmed(), verified);
    println!(
        "  {}   {}",
        "Member since:".dimmed(),
        format_timestamp(&profile.created_at)
    );
    println!();
    println!("  Chats: {}", "healthchat chat list".cyan());
}

async fn cmd_profile_update(
    client: &ApiClient,
    request: &UpdateUserProfileRequest,
    json: bool,
) -> Result<()> {
    require_auth(client)?;
    if request.is_empty() {
        anyhow::bail!("nothing to update: pass --name and/or --subscription-status");
    }
    let updated = client.update_user_profile(request).await?;
    if json {
        return print_json(&updated);
    }
    println!("{} Profile updated successfully", "✓".green());
    // The cached profile was invalidated; this read sees the refreshed copy.
    let profile = client.get_user_profile().await?;
    println!();
    print_profile(&profile);
    Ok(())
}

// -- Chats --

async fn cmd_chat_list(client: &ApiClient, json: bool) -> Result<()> {
    let chats = client.get_user_chat_list().await?;
    if json {
        return print_json(&chats);
    }
    if chats.is_empty() {
        println!("{}", "No chats yet.".dimmed());
        println!("  Start one: {}", "healthchat chat new \"<message>\"".cyan());
        return Ok(());
    }
    println!(
        "{:<8} {:<14} {:<18} {}",
        "ID".dimmed(),
        "Model".dimmed(),
        "Updated".dimmed(),
        "Title".dimmed()
    );
    for chat in &chats {
        let when = chat
            .updated_at
            .as_deref()
            .or(chat.created_at.as_deref())
            .or(chat.timestamp.as_deref())
            .map(format_timestamp)
            .unwrap_or_default();
        println!(
            "{:<8} {:<14} {:<18} {}",
            chat.id.to_string().cyan(),
            chat.model_name.as_deref().unwrap_or("-"),
            when,
            chat.display_title()
        );
    }
    println!("\n{} chat(s)", chats.len());
    Ok(())
}

async fn cmd_chat_show(client: &ApiClient, id: i64, json: bool) -> Result<()> {
    let content = client.get_chat_content(id).await?;
    if json {
        return print_json(&content);
    }
    print_chat(&content);
    Ok(())
}

fn print_chat(content: &ChatContent) {
    print!("{}", content.display_title().bold());
    if let Some(ref model) = content.model_name {
        print!("  {}", model.dimmed());
    }
    println!();
    println!();
    if content.messages.is_empty() {
        println!("{}", "No messages.".dimmed());
        return;
    }
    for message in &content.messages {
        let who = match message.sender {
            Sender::User => "you".cyan().to_string(),
            Sender::Bot => "bot".green().to_string(),
        };
        println!("{} {}", who, message.created_at_display().dimmed());
        for line in message.content.lines() {
            println!("  {line}");
        }
        println!();
    }
}

async fn cmd_chat_new(client: &ApiClient, model: &str, message: &str, json: bool) -> Result<()> {
    let response = client
        .create_chat(&CreateChatRequest {
            model_name: model.to_string(),
            message_content: message.to_string(),
        })
        .await?;
    if json {
        return print_json(&response);
    }
    let id = response.data.id;
    println!("{} Started chat {} with {}", "✓".green(), id.to_string().cyan(), model);
    if !response.message.is_empty() {
        println!("  {}", response.message.dimmed());
    }
    let content = client.get_chat_content(id).await?;
    println!();
    print_chat(&content);
    Ok(())
}

async fn cmd_chat_send(
    client: &ApiClient,
    id: i64,
    model: &str,
    message: &str,
    json: bool,
) -> Result<()> {
    let stored = client
        .add_message_to_chat(&AddMessageRequest {
            chat_id: id,
            model_name: model.to_string(),
            message_content: message.to_string(),
        })
        .await?;
    if json {
        return print_json(&stored);
    }
    let content = client.get_chat_content(id).await?;
    print_chat(&content);
    Ok(())
}

async fn cmd_chat_rename(client: &ApiClient, id: i64, title: &str) -> Result<()> {
    client.update_chat_title(id, title).await?;
    println!(
        "{} Renamed chat {} to {}",
        "✓".green(),
        id.to_string().cyan(),
        title.trim().bold()
    );
    Ok(())
}

async fn cmd_chat_delete(client: &ApiClient, id: i64, yes: bool) -> Result<()> {
    if !yes {
        eprint!("Delete chat {id}? This cannot be undone. [y/N] ");
        std::io::stderr().flush()?;
        if !is_yes(&read_line()?) {
            anyhow::bail!("delete cancelled (pass --yes to skip the prompt)");
        }
    }
    client.delete_chat(id).await?;
    println!("{} Deleted chat {}", "✓".green(), id.to_string().cyan());
    Ok(())
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

// -- Debug --

fn cmd_debug(client: &ApiClient, clear: bool) -> Result<()> {
    let auth = client.auth();
    if clear {
        auth.logout()?;
        println!("{} Cleared stored session", "✓".green());
        return Ok(());
    }

    let session = auth.snapshot();
    println!("{}", "--- Session (in memory) ---".dimmed());
    let state = if session.is_authenticated() {
        "✓ true".green().to_string()
    } else {
        "✗ false".red().to_string()
    };
    println!("  {} {}", "isAuthenticated:".dimmed(), state);
    println!("  {}           {}", "token:".dimmed(), preview(session.token()));
    println!(
        "  {}    {}",
        "refreshToken:".dimmed(),
        preview(session.refresh_token())
    );

    println!("{}", "--- Storage ---".dimmed());
    if let TokenStorage::File(ref store) = *auth.storage() {
        println!("  {}            {}", "file:".dimmed(), store.path().display());
    }
    let token = auth.storage().get(TOKEN_KEY);
    let refresh = auth.storage().get(REFRESH_TOKEN_KEY);
    println!("  {}           {}", "token:".dimmed(), preview(token.as_deref()));
    println!(
        "  {}    {}",
        "refreshToken:".dimmed(),
        preview(refresh.as_deref())
    );
    Ok(())
}

/// First 20 characters of a token followed by `...`, or `null`.
fn preview(token: Option<&str>) -> String {
    match token {
        Some(t) => format!("{}...", t.chars().take(20).collect::<String>()),
        None => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_chat_send() {
        let cli = Cli::try_parse_from(["healthchat", "chat", "send", "7", "hello", "-m", "Validify"])
            .unwrap();
        match cli {
            Cli::Chat {
                action:
                    ChatCommand::Send {
                        id, message, model, ..
                    },
            } => {
                assert_eq!(id, 7);
                assert_eq!(message, "hello");
                assert_eq!(model.as_deref(), Some("Validify"));
            }
            _ => panic!("expected chat send"),
        }
    }

    #[test]
    fn test_parse_profile_update() {
        let cli = Cli::try_parse_from([
            "healthchat",
            "profile",
            "update",
            "--subscription-status",
            "active",
        ])
        .unwrap();
        match cli {
            Cli::Profile {
                action:
                    ProfileCommand::Update {
                        name,
                        subscription_status,
                        ..
                    },
            } => {
                assert_eq!(name, None);
                assert_eq!(subscription_status.as_deref(), Some("active"));
            }
            _ => panic!("expected profile update"),
        }
    }

    #[test]
    fn test_chat_id_must_be_numeric() {
        assert!(Cli::try_parse_from(["healthchat", "chat", "show", "abc"]).is_err());
    }

    #[test]
    fn test_resolve_model_default_and_validation() {
        let config = HealthchatConfig::default_config();
        assert_eq!(resolve_model(None, &config).unwrap(), "Chartwright");
        assert_eq!(
            resolve_model(Some("Redactify".into()), &config).unwrap(),
            "Redactify"
        );
        let err = resolve_model(Some("gpt".into()), &config).unwrap_err();
        assert!(err.to_string().contains("unknown model"));
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview(None), "null");
        assert_eq!(preview(Some("short")), "short...");
        assert_eq!(
            preview(Some("abcdefghijklmnopqrstuvwxyz")),
            "abcdefghijklmnopqrst..."
        );
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
    }

    #[test]
    fn test_require_auth_guard() {
        let auth = Arc::new(AuthStore::in_memory());
        let client = ApiClient::new("http://127.0.0.1:1/api/proxy/", auth.clone()).unwrap();
        let err = require_auth(&client).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HealthchatError>(),
            Some(HealthchatError::Unauthenticated)
        ));
        assert_eq!(
            hint_for(&err),
            Some("Run `healthchat signin` to start a session.")
        );

        auth.hydrate("t", "r");
        assert!(require_auth(&client).is_ok());
    }

    #[tokio::test]
    async fn test_guarded_views_refuse_without_session() {
        let client = ApiClient::new(
            "http://127.0.0.1:1/api/proxy/",
            Arc::new(AuthStore::in_memory()),
        )
        .unwrap();
        assert!(cmd_dashboard(&client, true).await.is_err());
        let request = UpdateUserProfileRequest {
            name: Some("x".into()),
            subscription_status: None,
        };
        assert!(cmd_profile_update(&client, &request, true).await.is_err());
    }

    #[test]
    fn test_debug_clear_removes_stored_tokens() {
        let auth = Arc::new(AuthStore::in_memory());
        auth.set_credentials(&healthchat_core::session::Credentials::new("a", "b"))
            .unwrap();
        let client = ApiClient::new("http://127.0.0.1:1/api/proxy/", auth.clone()).unwrap();
        cmd_debug(&client, true).unwrap();
        assert!(!auth.is_authenticated());
        assert_eq!(auth.storage().get(TOKEN_KEY), None);
        assert_eq!(auth.storage().get(REFRESH_TOKEN_KEY), None);
    }
}
