mod config;
mod generate_cmd;
mod plan_cmds;
mod serve_cmd;
#[cfg(test)]
mod test_util;

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};

use syllabus_db::pool;

use config::SyllabusConfig;
use generate_cmd::{GenerateOptions, Store};

#[derive(Parser)]
#[command(
    name = "syllabus",
    version,
    about = "Generate, store and track multi-week study plans"
)]
struct Cli {
    /// Database URL (overrides SYLLABUS_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Owner id to act as (overrides SYLLABUS_OWNER env var)
    #[arg(long, global = true)]
    owner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a syllabus config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/syllabus")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the syllabus database and run migrations
    DbInit,
    /// Generate a study plan for a goal
    Generate {
        /// What you want to learn
        #[arg(long)]
        goal: String,
        /// Plan length in weeks (1-52)
        #[arg(long)]
        weeks: u32,
        /// Save the plan, unless one already exists for this goal
        #[arg(long, conflicts_with = "replace")]
        save: bool,
        /// Replace the plan with this ID by the generated one
        #[arg(long, value_name = "PLAN_ID")]
        replace: Option<String>,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stored plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Serve the HTTP API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// Print shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// List your plans, newest first
    List,
    /// Show a plan with its milestones, tasks and progress
    Show {
        /// Plan ID
        plan_id: String,
    },
    /// List a plan's tasks grouped by week
    Tasks {
        /// Plan ID
        plan_id: String,
    },
    /// Show completion stats
    Stats {
        /// Plan ID
        plan_id: String,
    },
    /// Mark a task complete
    Toggle {
        /// Plan ID
        plan_id: String,
        /// Task ID
        task_id: String,
        /// Mark the task incomplete instead
        #[arg(long)]
        undo: bool,
    },
    /// Create any tasks missing from a plan
    Materialize {
        /// Plan ID
        plan_id: String,
    },
    /// Delete a plan and its tasks
    Delete {
        /// Plan ID
        plan_id: String,
    },
    /// Delete every plan you own
    Purge {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

/// Execute the `syllabus init` command: write config file.
fn cmd_init(db_url: &str, owner: Option<&str>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        owner: owner.map(str::to_string),
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        generation: config::GenerationSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url       = {db_url}");
    if let Some(owner) = owner {
        println!("  owner              = {owner}");
    }
    println!("  generation.command = {}", cfg.generation.command);
    println!();
    println!("Next: run `syllabus db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `syllabus db-init` command: create database and run migrations.
async fn cmd_db_init(resolved: &SyllabusConfig) -> anyhow::Result<()> {
    println!("Initializing syllabus database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("syllabus db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, cli.owner.as_deref(), force)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "syllabus", &mut std::io::stdout());
        }
        Commands::DbInit => {
            let resolved = SyllabusConfig::resolve(cli.database_url.as_deref(), None)?;
            cmd_db_init(&resolved).await?;
        }
        Commands::Generate {
            goal,
            weeks,
            save,
            replace,
            json,
        } => {
            let resolved =
                SyllabusConfig::resolve(cli.database_url.as_deref(), cli.owner.as_deref())?;
            let pipeline = resolved.generation.build_pipeline();
            let store = match (save, replace) {
                (_, Some(id)) => Store::Replace(plan_cmds::parse_id("plan", &id)?),
                (true, None) => Store::Save,
                (false, None) => Store::Nothing,
            };
            let db_pool = if store == Store::Nothing {
                None
            } else {
                Some(pool::create_pool(&resolved.db_config).await?)
            };
            let options = GenerateOptions {
                goal: &goal,
                weeks,
                store,
                json,
            };
            let result = generate_cmd::run_generate(
                &pipeline,
                db_pool.as_ref(),
                &resolved.owner_id,
                options,
            )
            .await;
            if let Some(p) = db_pool {
                p.close().await;
            }
            result?;
        }
        Commands::Plan { command } => {
            let resolved =
                SyllabusConfig::resolve(cli.database_url.as_deref(), cli.owner.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = plan_cmds::run_plan_command(command, &db_pool, &resolved.owner_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Serve { bind, port } => {
            let resolved = SyllabusConfig::resolve(cli.database_url.as_deref(), None)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let state = serve_cmd::AppState {
                pool: db_pool.clone(),
                pipeline: Arc::new(resolved.generation.build_pipeline()),
            };
            let result = serve_cmd::run_serve(state, &bind, port).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
