//! Build command - run instructions through a build session

use super::open_session;
use crate::build::BuildSession;
use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::engine::{Empty, ImageConfig, ImageName};
use crate::error::{CairnError, CairnResult};
use crate::instructions::Instruction;
use console::style;
use tracing::debug;

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> CairnResult<()> {
    let tags = args
        .tags
        .iter()
        .map(|t| t.parse::<ImageName>())
        .collect::<CairnResult<Vec<_>>>()?;

    let mut instructions = Vec::new();
    if let Some(from) = &args.from {
        instructions.push(Instruction::from_image(from.clone()));
    }
    for line in &args.instructions {
        instructions.push(Instruction::parse(line)?);
    }
    if instructions.is_empty() {
        return Err(CairnError::User(
            "Nothing to build: pass --from and/or -i instructions".to_string(),
        ));
    }

    let context_dir = std::fs::canonicalize(&args.context).map_err(|e| {
        CairnError::io(format!("resolving context {}", args.context.display()), e)
    })?;
    let build_file = context_dir.join(&args.file);

    let mut session = open_session(config, context_dir, build_file, |options| {
        if args.no_cache {
            options.utilize_cache = false;
        }
    })
    .await?;
    debug!("Build session {}", session.id());

    session.check_ignore_file().await?;
    run_instructions(&mut session, instructions).await?;

    session.tag_image(&tags).await?;
    if args.push {
        for tag in &tags {
            session.push_image(tag).await?;
        }
    }

    eprintln!("{} Built {}", style("✓").green(), style(session.image_id()).cyan());
    println!("{}", session.image_id());
    Ok(())
}

/// Drive a session through an instruction sequence.
///
/// Each step is probed against the cache first; after the first miss the
/// remaining steps are collected and built in one engine request. Before a
/// lookup, LABEL, ENV, WORKDIR, USER and EXPOSE are applied to the draft so
/// the comparison sees the configuration the step would commit. Other
/// metadata instructions (CMD, ENTRYPOINT, VOLUME, ONBUILD, STOPSIGNAL) are
/// not tracked and only match layers with the same inherited values.
pub(crate) async fn run_instructions(
    session: &mut BuildSession,
    instructions: Vec<Instruction>,
) -> CairnResult<()> {
    for instruction in instructions {
        if instruction.is_from() {
            session.materialize().await?;
            let name = instruction
                .args
                .first()
                .cloned()
                .ok_or_else(|| CairnError::InvalidInstruction("FROM requires an image".to_string()))?;
            if name == "scratch" {
                session.push_instruction(instruction);
                session.materialize().await?;
            } else {
                let image = session.ensure_image(&name, "base image").await?;
                session.set_image(&image);
            }
            continue;
        }

        if session.image_id().is_empty() {
            return Err(CairnError::MissingBaseImage);
        }

        if instruction.keyword == "label" {
            session.add_labels(parse_labels(&instruction));
        } else {
            apply_to_draft(session.config_mut(), &instruction);
        }

        if !session.is_cache_busted() {
            let hit = {
                let mut step = session.temporary_cmd(cache_cmd(&instruction)?);
                step.probe_cache().await?
            };
            if hit {
                debug!("Step {:?} served from cache", instruction.keyword);
                continue;
            }
        }

        session.push_instruction(instruction);
    }

    session.materialize().await
}

/// Command the engine records on the layer an instruction commits
fn cache_cmd(instruction: &Instruction) -> CairnResult<Vec<String>> {
    let shell = |text: String| vec!["/bin/sh".to_string(), "-c".to_string(), text];
    Ok(match (instruction.keyword.as_str(), instruction.json) {
        ("run", true) => instruction.args.clone(),
        ("run", false) => shell(instruction.args.join(" ")),
        _ => shell(format!("#(nop) {}", instruction.to_line()?)),
    })
}

/// Record the config change a metadata instruction commits
fn apply_to_draft(config: &mut ImageConfig, instruction: &Instruction) {
    let text = instruction.args.join(" ");
    match instruction.keyword.as_str() {
        "env" => {
            let env = config.env.get_or_insert_with(Vec::new);
            for (key, value) in parse_env(&text) {
                let prefix = format!("{}=", key);
                env.retain(|entry| !entry.starts_with(&prefix));
                env.push(format!("{}={}", key, value));
            }
        }
        "workdir" => {
            let dir = text.trim();
            config.working_dir = if dir.starts_with('/') {
                dir.to_string()
            } else {
                format!("{}/{}", config.working_dir.trim_end_matches('/'), dir)
            };
        }
        "user" => config.user = text.trim().to_string(),
        "expose" => {
            let ports = config.exposed_ports.get_or_insert_with(Default::default);
            for port in text.split_whitespace() {
                let key = if port.contains('/') {
                    port.to_string()
                } else {
                    format!("{}/tcp", port)
                };
                ports.insert(key, Empty {});
            }
        }
        _ => {}
    }
}

/// Variables set by an ENV instruction, in either `K=V ...` or `K value` form
fn parse_env(text: &str) -> Vec<(String, String)> {
    let text = text.trim();
    let first = text.split_whitespace().next().unwrap_or_default();
    if !first.contains('=') {
        return match text.split_once(char::is_whitespace) {
            Some((key, value)) => vec![(key.to_string(), value.trim().to_string())],
            None => Vec::new(),
        };
    }
    text.split_whitespace()
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.trim_matches('"').to_string()))
        .collect()
}

/// `key=value` pairs of a LABEL instruction
fn parse_labels(instruction: &Instruction) -> Vec<(String, String)> {
    instruction
        .args
        .iter()
        .flat_map(|arg| arg.split_whitespace())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.trim_matches('"').to_string()))
        .collect()
}
