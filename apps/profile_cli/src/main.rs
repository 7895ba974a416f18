use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{EditingSession, ProfileClient, SessionItem};
use shared::{
    domain::CollectionKind,
    items::{
        Achievement, Education, Extracurricular, Link, OrderedItem, PortfolioProject,
        WorkExperience,
    },
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Edit a profile's ordered collections from the terminal")]
struct Cli {
    #[arg(long, env = "PROFILE_SERVER_URL", default_value = "http://127.0.0.1:8080")]
    server_url: String,
    /// Session token printed by `login`.
    #[arg(long, env = "PROFILE_TOKEN")]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in (creating the account if needed) and print a session token.
    Login {
        username: String,
        #[arg(long, env = "PROFILE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Print one collection in its stored order.
    Show { kind: CollectionKind },
    /// Move the item at FROM to TO and save the collection.
    Move {
        kind: CollectionKind,
        from: usize,
        to: usize,
    },
    /// Swap the item at INDEX with its upper or lower neighbour and save.
    Step {
        kind: CollectionKind,
        index: usize,
        #[arg(long)]
        down: bool,
    },
    /// Remove the item with ID and save.
    Remove { kind: CollectionKind, id: String },
    /// Append a link and save.
    AddLink {
        title: String,
        url: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Print someone's public profile.
    Public { username: String },
}

/// Runs `$call::<Item>(args..)` for the item type of `$kind`.
macro_rules! for_kind {
    ($kind:expr, $call:ident($($arg:expr),*)) => {
        match $kind {
            CollectionKind::Links => $call::<Link>($($arg),*).await,
            CollectionKind::Experience => $call::<WorkExperience>($($arg),*).await,
            CollectionKind::Education => $call::<Education>($($arg),*).await,
            CollectionKind::Portfolio => $call::<PortfolioProject>($($arg),*).await,
            CollectionKind::Achievements => $call::<Achievement>($($arg),*).await,
            CollectionKind::Extracurriculars => $call::<Extracurricular>($($arg),*).await,
        }
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut client = ProfileClient::new(&cli.server_url)?;
    if let Some(token) = cli.token.clone() {
        client = client.with_token(token);
    }

    match cli.command {
        Command::Login { username, password } => {
            let login = client.login(&username, &password).await?;
            println!("user_id={} role={}", login.user_id.0, login.role.as_str());
            println!("export PROFILE_TOKEN={}", login.token);
        }
        Command::Public { username } => {
            let profile = client.public_profile(&username).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        command => {
            if client.token().is_none() {
                bail!("this command needs a session token; run `login` first");
            }
            run_edit(&client, command).await?;
        }
    }

    Ok(())
}

async fn run_edit(client: &ProfileClient, command: Command) -> Result<()> {
    match command {
        Command::Show { kind } => for_kind!(kind, show(client)),
        Command::Move { kind, from, to } => for_kind!(kind, move_item(client, from, to)),
        Command::Step { kind, index, down } => for_kind!(kind, step_item(client, index, down)),
        Command::Remove { kind, id } => for_kind!(kind, remove_item(client, &id)),
        Command::AddLink {
            title,
            url,
            description,
        } => add_link(client, title, url, description).await,
        Command::Login { .. } | Command::Public { .. } => Ok(()),
    }
}

async fn show<T: SessionItem>(client: &ProfileClient) -> Result<()> {
    let data = client.fetch_collection::<T>().await?;
    println!("{} (revision {})", T::KIND, data.revision);
    for (index, item) in data.items.iter().enumerate() {
        println!("{index}\t{}", serde_json::to_string(item)?);
    }
    Ok(())
}

async fn move_item<T: SessionItem>(
    client: &ProfileClient,
    from: usize,
    to: usize,
) -> Result<()> {
    let mut session = client.load_session().await?;
    session.start_edit::<T>();
    if !session.editor_mut::<T>().reorder(from, to)? {
        bail!("cannot move {} item {from} to {to}", T::KIND);
    }
    save::<T>(client, &mut session).await
}

async fn step_item<T: SessionItem>(
    client: &ProfileClient,
    index: usize,
    down: bool,
) -> Result<()> {
    let mut session = client.load_session().await?;
    session.start_edit::<T>();
    let editor = session.editor_mut::<T>();
    let moved = if down {
        editor.move_down(index)?
    } else {
        editor.move_up(index)?
    };
    if !moved {
        bail!("{} item {index} is already at the edge", T::KIND);
    }
    save::<T>(client, &mut session).await
}

async fn remove_item<T: SessionItem>(client: &ProfileClient, id: &str) -> Result<()> {
    let mut session = client.load_session().await?;
    session.start_edit::<T>();
    if !session.editor_mut::<T>().remove(id)? {
        bail!("no {} item with id '{id}'", T::KIND);
    }
    save::<T>(client, &mut session).await
}

async fn add_link(
    client: &ProfileClient,
    title: String,
    url: String,
    description: Option<String>,
) -> Result<()> {
    let mut session = client.load_session().await?;
    session.start_edit::<Link>();
    let link = Link {
        description,
        ..Link::new(title, url)
    };
    let id = session.editor_mut::<Link>().add(link)?;
    info!(%id, "link added to draft");
    save::<Link>(client, &mut session).await
}

async fn save<T: SessionItem>(client: &ProfileClient, session: &mut EditingSession) -> Result<()> {
    session
        .save::<T, _>(client)
        .await
        .with_context(|| format!("saving {} failed", T::KIND))?;
    let order: Vec<&str> = session
        .editor::<T>()
        .committed()
        .iter()
        .map(|item| item.id())
        .collect();
    println!("{} saved: {}", T::KIND, order.join(", "));
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
