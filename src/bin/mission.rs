//! `mission` — the host CLI surface for the mission orchestration engine (§6, §10.4).
//!
//! A small, hand-rolled argument parser over `std::env::args()`: the surface is four flags,
//! not enough to justify pulling in a heavyweight CLI framework (see DESIGN.md).

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use cloudllm::client_wrapper::ClientWrapper;
use cloudllm::clients::openai::OpenAIClient;
use cloudllm::mission::agent_manager::AgentManager;
use cloudllm::mission::chat_client::ChatClientWrapper;
use cloudllm::mission::communicator::Communicator;
use cloudllm::mission::config::MissionConfig;
use cloudllm::mission::mission_manager::{Mission, MissionManager};
use cloudllm::mission::registry::Registry;
use cloudllm::mission::scheduler::run_mission;
use cloudllm::mission::workspace::{list_workspaces, WorkspaceStatus};

struct CliArgs {
    description: Option<String>,
    debug: bool,
    new: bool,
    max_iterations: Option<usize>,
}

fn parse_args(raw: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut description_parts = Vec::new();
    let mut debug = false;
    let mut new = false;
    let mut max_iterations = None;

    let mut args = raw.peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--debug" => debug = true,
            "--new" => new = true,
            "--max-iterations" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--max-iterations requires a value".to_string())?;
                max_iterations = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("invalid --max-iterations value: '{value}'"))?,
                );
            }
            other if other.starts_with("--max-iterations=") => {
                let value = &other["--max-iterations=".len()..];
                max_iterations = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("invalid --max-iterations value: '{value}'"))?,
                );
            }
            other => description_parts.push(other.to_string()),
        }
    }

    Ok(CliArgs {
        description: if description_parts.is_empty() {
            None
        } else {
            Some(description_parts.join(" "))
        },
        debug,
        new,
        max_iterations,
    })
}

/// Derive a short display name from a free-form objective, the way the workspace layer
/// slugifies mission names for its own directory naming (§4.3).
fn derive_name(objective: &str) -> String {
    let words: Vec<&str> = objective.split_whitespace().take(6).collect();
    if words.is_empty() {
        "Untitled Mission".to_string()
    } else {
        words.join(" ")
    }
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// A resumable mission log, paired with the workspace config it was loaded from, for display
/// in the resume menu (§6).
struct ResumeCandidate {
    mission: Mission,
    dir_name: String,
}

fn resumable_missions(base_dir: &std::path::Path) -> Vec<ResumeCandidate> {
    let Ok(configs) = list_workspaces(base_dir, None) else {
        return Vec::new();
    };
    let mut candidates = Vec::new();
    for config in configs {
        if !matches!(
            config.status,
            WorkspaceStatus::Active | WorkspaceStatus::Paused | WorkspaceStatus::Failed
        ) {
            continue;
        }
        let log_path = base_dir.join(&config.dir_name).join("state/mission_log.json");
        let Ok(raw) = std::fs::read_to_string(&log_path) else {
            continue;
        };
        let Ok(mission) = serde_json::from_str::<Mission>(&raw) else {
            continue;
        };
        if !mission.is_resumable() {
            continue;
        }
        candidates.push(ResumeCandidate {
            mission,
            dir_name: config.dir_name,
        });
        if candidates.len() >= 5 {
            break;
        }
    }
    candidates
}

/// The resume menu: shows up to 5 most recent resumable missions, lets the user pick one,
/// start a new mission (`n`), or quit (`q`) (§6).
fn run_resume_menu(base_dir: &std::path::Path) -> io::Result<Option<ResumeCandidate>> {
    let candidates = resumable_missions(base_dir);
    if candidates.is_empty() {
        return Ok(None);
    }

    println!("Resumable missions:");
    for (i, candidate) in candidates.iter().enumerate() {
        println!(
            "  {}) {} — {} cycles, ${:.2} spent, status {:?}",
            i + 1,
            candidate.mission.name,
            candidate.mission.cycle_ids.len(),
            candidate.mission.total_cost,
            candidate.mission.status,
        );
    }
    println!("  n) start a new mission");
    println!("  q) quit");

    loop {
        let choice = prompt("Choose an option: ")?;
        match choice.as_str() {
            "n" => return Ok(None),
            "q" => std::process::exit(0),
            other => {
                if let Ok(index) = other.parse::<usize>() {
                    if index >= 1 && index <= candidates.len() {
                        let mut iter = candidates.into_iter();
                        return Ok(iter.nth(index - 1));
                    }
                }
                println!("invalid choice, try again");
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(1);
        }
    };

    if args.debug {
        std::env::set_var("RUST_LOG", "debug");
    } else if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    cloudllm::init_logger();

    let mut config = MissionConfig::from_env();
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }

    let api_key = match MissionConfig::require_openai_api_key() {
        Ok(key) => key,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(1);
        }
    };

    let base_dir: PathBuf = config.workspace_base_dir.clone();
    if let Err(e) = std::fs::create_dir_all(&base_dir) {
        eprintln!("could not create workspace base directory {base_dir:?}: {e}");
        return ExitCode::from(1);
    }

    let mut resume_name: Option<String> = None;
    let mut resume_objective: Option<String> = None;

    if !args.new {
        match run_resume_menu(&base_dir) {
            Ok(Some(candidate)) => {
                resume_name = Some(candidate.mission.name.clone());
                resume_objective = Some(candidate.mission.objective.clone());
            }
            Ok(None) => {}
            Err(e) => {
                eprintln!("failed to read resume menu: {e}");
                return ExitCode::from(1);
            }
        }
    }

    let objective = match resume_objective {
        Some(objective) => objective,
        None => match args.description {
            Some(description) => description,
            None => match prompt("Describe this mission's objective: ") {
                Ok(line) if !line.is_empty() => line,
                Ok(_) => {
                    eprintln!("a mission objective is required");
                    return ExitCode::from(1);
                }
                Err(e) => {
                    eprintln!("failed to read mission objective: {e}");
                    return ExitCode::from(1);
                }
            },
        },
    };

    let name = resume_name.unwrap_or_else(|| derive_name(&objective));
    let resume = !args.new;

    let client: Arc<dyn ClientWrapper> = Arc::new(OpenAIClient::new_with_model_string(
        &api_key,
        &config.openai_model,
    ));
    let chat_client = Arc::new(ChatClientWrapper::new(client));
    let communicator = Arc::new(Communicator::new(chat_client, config.openai_model.clone()));
    let registry = match Registry::open(base_dir.join("registry.json")) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            eprintln!("failed to open registry: {e}");
            return ExitCode::from(1);
        }
    };
    let agent_manager = Arc::new(AgentManager::new(registry.clone(), communicator.clone()));
    let mission_manager = MissionManager::new(base_dir.clone());

    log::info!(target: "mission::cli", "starting mission '{name}' (resume={resume})");

    match run_mission(
        registry,
        agent_manager,
        communicator,
        &mission_manager,
        &config,
        &name,
        &objective,
        resume,
    )
    .await
    {
        Ok(outcome) => {
            println!(
                "mission '{}' finished: {:?} (cycles: {}, cost: ${:.2})",
                outcome.mission.name,
                outcome.final_status,
                outcome.mission.cycle_ids.len(),
                outcome.mission.total_cost,
            );
            ExitCode::from(0)
        }
        Err(e) => {
            eprintln!("mission run failed: {e}");
            ExitCode::from(1)
        }
    }
}
