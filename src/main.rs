//! Dockhand - command line entry point.
//!
//! Usage: dockhand [GLOBAL OPTIONS] <COMMAND> [ARGS]
//!
//! Global options:
//!   --server <name>        Use a `[[servers]]` entry from the config
//!   --host <host>          Host, overriding the entry
//!   --user <user>          SSH user, overriding the entry
//!   --port <port>          SSH port (default 22)
//!   --password-env <VAR>   Read the SSH/sudo password from $VAR
//!   --sudo                 Probe for sudo on connect
//!   --config <path>        Config file (default ~/.dockhand/config.toml)
//!   --version, -v          Show version

use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::process;

use dockhand::config::{Config, ServerEntry};
use dockhand::docker::command;
use dockhand::docker::{
    BuildRequest, ContainerEdit, DockerApi, EnvVar, Mapping, PortMapping, PruneScope, PullOutcome,
    RunOptions, VolumeMapping,
};
use dockhand::logging;
use dockhand::remote::{RemoteSession, ServerTarget, shell};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "\
Usage: dockhand [GLOBAL OPTIONS] <COMMAND> [ARGS]

Commands:
  ps                                  List containers
  images                              List images
  inspect <id>                        Show a container's configuration
  start|stop|restart <id>             Change container state
  rm [-f] <id>                        Stop and remove a container
  port add|rm <id> <host> <container> Edit port mappings and recreate
  volume add|rm <id> <src> <dst>      Edit volume mappings and recreate
  env add|rm <id> <KEY> <VALUE>       Edit environment and recreate
  cmd <id> <command...>               Replace the command and recreate
  pull <ref> [--sync]                 Pull an image
  build <path> [name] [--build-arg K=V]...
                                      Build from a Dockerfile or directory
  logs <id> [--tail N]                Show container output
  stats <id>                          Show resource usage
  health <id>                         Show health check state
  networks                            List networks
  prune [--all] [--volumes]           Remove unused data
  doctor                              Check the host

Global options:
  --server <name>  --host <host>  --user <user>  --port <port>
  --password-env <VAR>  --sudo  --config <path>  --version";

/// Connection flags shared by every command.
#[derive(Debug, Default)]
struct GlobalArgs {
    server: Option<String>,
    host: Option<String>,
    user: Option<String>,
    port: Option<u16>,
    password_env: Option<String>,
    sudo: bool,
    config: Option<PathBuf>,
    version: bool,
    help: bool,
}

type CliResult<T> = Result<T, Box<dyn Error>>;

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: Vec<String>) -> CliResult<()> {
    let (globals, rest) = split_globals(args)?;
    if globals.version {
        println!("dockhand v{}", VERSION);
        return Ok(());
    }
    let Some((name, params)) = rest.split_first() else {
        println!("{}", USAGE);
        return Ok(());
    };
    if globals.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = match &globals.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    let target = resolve_target(&config, &globals)?;
    tracing::info!("Connecting to {}", target.connection_string());
    let session = RemoteSession::open_with(target, config.session.options())?;
    let mut api = DockerApi::new(session).with_staging_dir(config.session.staging_dir.clone());

    dispatch(&mut api, name, params)
}

/// Reads global options up to the first non-option word. That word and
/// everything after it are returned untouched as the command.
fn split_globals(args: Vec<String>) -> CliResult<(GlobalArgs, Vec<String>)> {
    let mut globals = GlobalArgs::default();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| -> CliResult<String> {
            iter.next().ok_or_else(|| format!("{} needs a value", flag).into())
        };
        match arg.as_str() {
            "--server" => globals.server = Some(value("--server")?),
            "--host" => globals.host = Some(value("--host")?),
            "--user" => globals.user = Some(value("--user")?),
            "--port" => {
                let raw = value("--port")?;
                let port = raw
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p > 0)
                    .ok_or_else(|| format!("invalid port: {}", raw))?;
                globals.port = Some(port);
            }
            "--password-env" => globals.password_env = Some(value("--password-env")?),
            "--config" => globals.config = Some(PathBuf::from(value("--config")?)),
            "--sudo" => globals.sudo = true,
            "--version" | "-v" => globals.version = true,
            "--help" | "-h" => globals.help = true,
            flag if flag.starts_with('-') => return Err(format!("unknown option: {}", flag).into()),
            _ => {
                let mut rest = vec![arg];
                rest.extend(iter);
                return Ok((globals, rest));
            }
        }
    }

    Ok((globals, Vec::new()))
}

/// Builds the target from a config entry and/or ad hoc flags.
fn resolve_target(config: &Config, globals: &GlobalArgs) -> CliResult<ServerTarget> {
    let mut entry = match &globals.server {
        Some(name) => config.server(name)?.clone(),
        None => {
            let host = globals.host.clone().ok_or("--host or --server is required")?;
            let user = globals
                .user
                .clone()
                .or_else(|| env::var("USER").ok())
                .ok_or("--user is required")?;
            ServerEntry::new("adhoc", host, user)
        }
    };

    if let Some(host) = &globals.host {
        entry.host.clone_from(host);
    }
    if let Some(user) = &globals.user {
        entry.user.clone_from(user);
    }
    if let Some(port) = globals.port {
        entry.port = port;
    }
    if globals.password_env.is_some() {
        entry.password_env.clone_from(&globals.password_env);
    }
    entry.require_elevation |= globals.sudo;

    if entry.host.is_empty() || entry.user.is_empty() {
        return Err("host and user must not be empty".into());
    }
    Ok(entry.target())
}

fn dispatch(api: &mut DockerApi<RemoteSession>, name: &str, params: &[String]) -> CliResult<()> {
    match name {
        "ps" => {
            println!("{:<14} {:<24} {:<28} {:<10} {}", "ID", "NAME", "IMAGE", "STATUS", "PORTS");
            for c in api.list_containers()? {
                println!(
                    "{:<14} {:<24} {:<28} {:<10} {}",
                    short(&c.id),
                    c.name,
                    c.image,
                    c.status,
                    c.ports.unwrap_or_default()
                );
            }
        }
        "images" => {
            println!("{:<14} {:<40} {:<10} {}", "ID", "IMAGE", "SIZE", "CREATED");
            for img in api.list_images()? {
                println!("{:<14} {:<40} {:<10} {}", short(&img.id), img.full_name(), img.size, img.created_at);
            }
        }
        "networks" => {
            for net in api.list_networks()? {
                println!("{:<14} {:<24} {:<10} {}", short(&net.id), net.name, net.driver, net.scope);
            }
        }
        "inspect" => {
            let detail = api.inspect(arg(params, 0, "container id")?)?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
        "start" => println!("{}", shell::from_display(&api.start(arg(params, 0, "container id")?)?)),
        "stop" => println!("{}", shell::from_display(&api.stop(arg(params, 0, "container id")?)?)),
        "restart" => println!("{}", shell::from_display(&api.restart(arg(params, 0, "container id")?)?)),
        "rm" => {
            let force = params.iter().any(|p| p == "-f" || p == "--force");
            let positional = positionals(params);
            println!("{}", shell::from_display(&api.delete(arg(&positional, 0, "container id")?, force)?));
        }
        "port" | "volume" | "env" => {
            let action = arg(params, 0, "add or rm")?;
            let id = arg(params, 1, "container id")?;
            let first = arg(params, 2, "first value")?;
            let second = arg(params, 3, "second value")?;
            let edit = pair_edit(name, action, first, second)?;
            commit_edit(api, id, &edit)?;
        }
        "cmd" => {
            let id = arg(params, 0, "container id")?;
            let command_line = params.get(1..).unwrap_or_default().join(" ");
            commit_edit(api, id, &ContainerEdit::SetCommand(command_line))?;
        }
        "pull" => {
            let reference = arg(params, 0, "image reference")?;
            let sync = params.iter().any(|p| p == "--sync");
            match api.pull_image(reference, sync)? {
                PullOutcome::Launched(job) => match job.pid {
                    Some(pid) => println!("Pull started (pid {}), log: {}", pid, job.log_path),
                    None => println!("Pull started, log: {}", job.log_path),
                },
                PullOutcome::Completed { output, succeeded } => {
                    println!("{}", output);
                    if !succeeded {
                        return Err(format!("pull of {} did not succeed", reference).into());
                    }
                }
            }
        }
        "build" => {
            let request = build_request(params)?;
            let report = api.build_image(&request)?;
            println!("{}", report.output);
            if !report.succeeded {
                return Err(format!("build of {} failed, log: {}", report.image_name, report.log_path).into());
            }
        }
        "logs" => {
            let tail = flag_value(params, "--tail")
                .map(|raw| raw.parse::<usize>().map_err(|_| format!("invalid --tail: {}", raw)))
                .transpose()?;
            let positional = positionals_skipping(params, &["--tail"]);
            for line in api.logs(arg(&positional, 0, "container id")?, tail)? {
                match line.timestamp {
                    Some(ts) => println!("[{}] {}", ts, line.message),
                    None => println!("{}", line.message),
                }
            }
        }
        "stats" => {
            let s = api.stats(arg(params, 0, "container id")?)?;
            println!("CPU {}  MEM {} {} ({})", s.cpu_percent, s.mem_usage, s.mem_limit, s.mem_percent);
        }
        "health" => match api.health(arg(params, 0, "container id")?)? {
            Some(report) => {
                println!("{} (failing streak {})", report.status, report.failing_streak);
                if let Some(output) = report.last_output() {
                    println!("{}", output);
                }
            }
            None => println!("no health check"),
        },
        "prune" => {
            let scope = PruneScope {
                all_images: params.iter().any(|p| p == "--all"),
                volumes: params.iter().any(|p| p == "--volumes"),
            };
            println!("{}", shell::from_display(&api.prune(scope)?));
        }
        "doctor" => {
            for line in api.diagnose() {
                println!("{}", line);
            }
        }
        other => return Err(format!("unknown command: {}\n\n{}", other, USAGE).into()),
    }
    Ok(())
}

fn pair_edit(kind: &str, action: &str, first: &str, second: &str) -> CliResult<ContainerEdit> {
    let edit = match (kind, action) {
        ("port", "add") => ContainerEdit::AddPort(PortMapping::parse(&format!("{}:{}", first, second))?),
        ("port", "rm") => ContainerEdit::RemovePort(PortMapping::parse(&format!("{}:{}", first, second))?),
        ("volume", "add") => ContainerEdit::AddVolume(VolumeMapping::try_new(first, second)?),
        ("volume", "rm") => ContainerEdit::RemoveVolume(VolumeMapping::try_new(first, second)?),
        ("env", "add") => ContainerEdit::AddEnv(EnvVar::try_new(first, second)?),
        ("env", "rm") => ContainerEdit::RemoveEnv(EnvVar::try_new(first, second)?),
        _ => return Err(format!("expected `{} add` or `{} rm`", kind, kind).into()),
    };
    Ok(edit)
}

/// Applies one edit to the inspected container, prints the run command,
/// then recreates the container.
fn commit_edit(api: &mut DockerApi<RemoteSession>, id: &str, edit: &ContainerEdit) -> CliResult<()> {
    let desired = api.edit(id, std::slice::from_ref(edit))?;
    println!("{}", edit);
    println!("{}", command::run(&desired, &RunOptions::preserving(&desired)));
    let output = api.commit(&desired)?;
    println!("{}", shell::from_display(&output));
    Ok(())
}

fn build_request(params: &[String]) -> CliResult<BuildRequest> {
    let positional = positionals_skipping(params, &["--build-arg"]);
    let mut request = BuildRequest::new(arg(&positional, 0, "build context path")?);
    if let Some(name) = positional.get(1) {
        request = request.with_name(name.clone());
    }

    let mut iter = params.iter();
    while let Some(param) = iter.next() {
        if param == "--build-arg" {
            let pair = iter.next().ok_or("--build-arg needs K=V")?;
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("invalid --build-arg: {}", pair))?;
            request = request.with_arg(key, value);
        }
    }
    Ok(request)
}

fn arg<'a>(params: &'a [String], index: usize, what: &str) -> CliResult<&'a str> {
    params
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| format!("missing {}", what).into())
}

fn flag_value<'a>(params: &'a [String], flag: &str) -> Option<&'a str> {
    params
        .iter()
        .position(|p| p == flag)
        .and_then(|i| params.get(i + 1))
        .map(String::as_str)
}

/// Parameters that are not flags.
fn positionals(params: &[String]) -> Vec<String> {
    params.iter().filter(|p| !p.starts_with('-')).cloned().collect()
}

/// Parameters that are neither flags nor the values of `valued` flags.
fn positionals_skipping(params: &[String], valued: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    let mut iter = params.iter();
    while let Some(param) = iter.next() {
        if valued.contains(&param.as_str()) {
            iter.next();
        } else if !param.starts_with('-') {
            out.push(param.clone());
        }
    }
    out
}

fn short(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
