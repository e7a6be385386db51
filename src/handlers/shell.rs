use std::path::PathBuf;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::CONFIG;
use crate::llm::media::load_image_asset;
use crate::llm::ContentService;
use crate::studio::presets::{style_preset, suggested_briefs, STYLE_PRESETS};
use crate::studio::session::ClassificationTicket;
use crate::studio::{save_generated, CropAspect, GenerationResult, ShotType, Studio};

const SHELL_HELP: &str = "Commands:
  hero <path|url>           set the hero item image
  clear-hero                remove the hero item image
  inspiration <path|url>    set the inspiration image
  clear-inspiration         remove the inspiration image
  brief <text>              set the creative brief
  shot model|product        choose the shot type
  presets                   list suggested briefs and style presets
  use <number|style>        copy a suggestion or style preset into the brief
  generate                  generate, or refine the current result
  status                    show the current session
  export 1:1|9:16|16:9      crop and save the current result
  start-over                discard the current result
  help                      show this help
  quit                      leave the studio";

/// Where the shell writes generated results and exports.
#[derive(Debug, Clone)]
pub struct ShellPaths {
    pub output_dir: PathBuf,
    pub export_dir: PathBuf,
}

impl ShellPaths {
    pub fn from_config() -> Self {
        Self {
            output_dir: CONFIG.output_dir.clone(),
            export_dir: CONFIG.export_dir.clone(),
        }
    }
}

/// Per-run shell state; the pending generation is awaited before exit.
struct Shell<S> {
    studio: Studio<S>,
    paths: ShellPaths,
    generation: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Hero(String),
    ClearHero,
    Inspiration(String),
    ClearInspiration,
    Brief(String),
    Shot(String),
    Presets,
    Use(String),
    Generate,
    Status,
    Export(String),
    StartOver,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_shell_line(line: &str) -> Option<ShellCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };
    let command = match name.to_lowercase().as_str() {
        "hero" => ShellCommand::Hero(rest.to_string()),
        "clear-hero" => ShellCommand::ClearHero,
        "inspiration" => ShellCommand::Inspiration(rest.to_string()),
        "clear-inspiration" => ShellCommand::ClearInspiration,
        "brief" => ShellCommand::Brief(rest.to_string()),
        "shot" => ShellCommand::Shot(rest.to_string()),
        "presets" => ShellCommand::Presets,
        "use" => ShellCommand::Use(rest.to_string()),
        "generate" | "refine" => ShellCommand::Generate,
        "status" => ShellCommand::Status,
        "export" => ShellCommand::Export(rest.to_string()),
        "start-over" | "reset" => ShellCommand::StartOver,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => ShellCommand::Unknown(other.to_string()),
    };
    Some(command)
}

fn print_status<S: ContentService + 'static>(studio: &Studio<S>) {
    let snapshot = studio.snapshot();
    if let Some(err) = studio.config_error() {
        println!("Configuration error: {err}");
    }
    println!("Hero:        {}", snapshot.hero.as_deref().unwrap_or("(none)"));
    println!(
        "Inspiration: {}",
        snapshot.inspiration.as_deref().unwrap_or("(none)")
    );
    println!(
        "Category:    {}",
        snapshot
            .category
            .as_ref()
            .map(|category| category.to_string())
            .unwrap_or_else(|| "(pending)".to_string())
    );
    let shots: Vec<&str> = snapshot.available_shots.iter().map(|shot| shot.label()).collect();
    println!("Shot:        {} (available: {})", snapshot.shot, shots.join(", "));
    println!(
        "Brief:       {}",
        if snapshot.brief.is_empty() {
            "(default)"
        } else {
            snapshot.brief.as_str()
        }
    );
    match &snapshot.result {
        None => println!("Result:      (none)"),
        Some(GenerationResult::Image(image)) => {
            println!("Result:      {}", image.display_name())
        }
        Some(GenerationResult::Failed { message, retained }) => {
            println!("Result:      error: {message}");
            if let Some(image) = retained {
                println!("             still holding {}", image.display_name());
            }
        }
    }
    if snapshot.generating {
        println!("A generation is in progress.");
    }
}

fn print_presets<S: ContentService + 'static>(studio: &Studio<S>) {
    let snapshot = studio.snapshot();
    println!("Suggested briefs:");
    for (index, brief) in suggested_briefs(snapshot.category.as_ref()).iter().enumerate() {
        println!("  {}. {}", index + 1, brief);
    }
    println!("Style presets:");
    for preset in STYLE_PRESETS.iter() {
        println!("  {:<12} {}", preset.name, preset.brief);
    }
}

fn resolve_preset<S: ContentService + 'static>(studio: &Studio<S>, selector: &str) -> Option<&'static str> {
    if let Ok(number) = selector.parse::<usize>() {
        let category = studio.snapshot().category;
        return number
            .checked_sub(1)
            .and_then(|index| suggested_briefs(category.as_ref()).get(index))
            .copied();
    }
    style_preset(selector).map(|preset| preset.brief)
}

fn spawn_classification<S: ContentService + 'static>(studio: &Studio<S>, ticket: ClassificationTicket) {
    let studio = studio.clone();
    tokio::spawn(async move {
        if let Some(category) = studio.classify_hero(ticket).await {
            let shots: Vec<&str> = studio
                .snapshot()
                .available_shots
                .iter()
                .map(|shot| shot.label())
                .collect();
            println!("Detected category: {category} (shot types: {})", shots.join(", "));
        }
    });
}

fn spawn_generation<S: ContentService + 'static>(
    studio: &Studio<S>,
    output_dir: PathBuf,
) -> JoinHandle<()> {
    let studio = studio.clone();
    tokio::spawn(async move {
        match studio.generate().await {
            Ok(image) => match save_generated(&image, &output_dir).await {
                Ok(path) => println!("Result saved to {}", path.display()),
                Err(err) => println!("{err}"),
            },
            Err(err) => println!("{err}"),
        }
    })
}

impl<S: ContentService + 'static> Shell<S> {
    fn generation_pending(&self) -> bool {
        self.generation
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn finish_pending(&mut self) {
        let Some(handle) = self.generation.take() else {
            return;
        };
        if !handle.is_finished() {
            println!("Waiting for the current generation to finish...");
        }
        if let Err(err) = handle.await {
            error!("Generation task failed: {err}");
            println!("Generation stopped unexpectedly: {err}");
        }
    }

    async fn handle_line(&mut self, command: ShellCommand) -> bool {
        let studio = &self.studio;
        match command {
            ShellCommand::Hero(source) => match load_image_asset(&source).await {
                Ok(asset) => {
                    let ticket = studio.set_hero(asset);
                    println!("Hero image set. Detecting category...");
                    spawn_classification(studio, ticket);
                }
                Err(err) => println!("{err}"),
            },
            ShellCommand::ClearHero => {
                studio.remove_hero();
                println!("Hero image removed.");
            }
            ShellCommand::Inspiration(source) => match load_image_asset(&source).await {
                Ok(asset) => {
                    studio.set_inspiration(Some(asset));
                    println!("Inspiration image set.");
                }
                Err(err) => println!("{err}"),
            },
            ShellCommand::ClearInspiration => {
                studio.set_inspiration(None);
                println!("Inspiration image removed.");
            }
            ShellCommand::Brief(text) => {
                studio.set_brief(&text);
                println!("Brief updated.");
            }
            ShellCommand::Shot(value) => match ShotType::parse(&value) {
                Some(shot) => match studio.select_shot(shot) {
                    Ok(()) => println!("Shot type: {shot}"),
                    Err(err) => println!("{err}"),
                },
                None => println!("Unknown shot type '{value}'. Use model or product."),
            },
            ShellCommand::Presets => print_presets(studio),
            ShellCommand::Use(selector) => match resolve_preset(studio, &selector) {
                Some(brief) => {
                    studio.set_brief(brief);
                    println!("Brief: {brief}");
                }
                None => println!("No preset matches '{selector}'."),
            },
            ShellCommand::Generate => {
                if let Some(err) = studio.config_error() {
                    println!("{err}");
                } else if self.generation_pending() || studio.snapshot().generating {
                    println!("A generation is already in progress. Wait for it to finish.");
                } else {
                    println!("Generating...");
                    self.generation = Some(spawn_generation(studio, self.paths.output_dir.clone()));
                }
            }
            ShellCommand::Status => print_status(studio),
            ShellCommand::Export(value) => match CropAspect::parse(&value) {
                Some(aspect) => match studio.export(aspect, &self.paths.export_dir).await {
                    Ok(path) => println!("Exported {}", path.display()),
                    Err(err) => println!("{err}"),
                },
                None => println!("Unknown aspect '{value}'. Use 1:1, 9:16 or 16:9."),
            },
            ShellCommand::StartOver => {
                studio.start_over();
                println!("Result discarded. The next generation starts fresh.");
            }
            ShellCommand::Help => println!("{SHELL_HELP}"),
            ShellCommand::Quit => return false,
            ShellCommand::Unknown(name) => println!("Unknown command '{name}'. Type help for a list."),
        }
        true
    }
}

pub async fn run_shell<S: ContentService + 'static>(studio: Studio<S>) -> Result<()> {
    let input = BufReader::new(tokio::io::stdin());
    run_shell_with(studio, input, ShellPaths::from_config()).await
}

pub async fn run_shell_with<S, R>(studio: Studio<S>, input: R, paths: ShellPaths) -> Result<()>
where
    S: ContentService + 'static,
    R: AsyncBufRead + Unpin,
{
    println!("Lookbook Studio. Type help for commands.");
    if let Some(err) = studio.config_error() {
        println!("Configuration error: {err}");
        println!("Generation and category detection are disabled; local actions still work.");
    }
    info!("Studio shell started");

    let mut shell = Shell {
        studio,
        paths,
        generation: None,
    };
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!("Failed to read from stdin: {err}");
                break;
            }
        };
        let Some(command) = parse_shell_line(&line) else {
            continue;
        };
        if !shell.handle_line(command).await {
            break;
        }
    }

    if shell.generation_pending() {
        warn!("Shell closing with a generation in flight; waiting for it");
    }
    shell.finish_pending().await;
    info!("Studio shell closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::classifier::tests::FakeService;
    use crate::llm::media::tests::png_fixture;
    use crate::llm::media::ImageAsset;

    fn asset(width: u32, height: u32, shade: u8) -> ImageAsset {
        ImageAsset::from_bytes(png_fixture(width, height, shade), None).unwrap()
    }

    fn slow_studio() -> Studio<FakeService> {
        let service = FakeService {
            delay_ms: 80,
            ..FakeService::default()
        };
        service.push_image(Ok(vec![asset(16, 9, 2)]));
        let studio = Studio::new(Ok(service), false);
        studio.set_hero(asset(8, 8, 1));
        studio
    }

    fn scratch_paths(name: &str) -> ShellPaths {
        let dir = std::env::temp_dir().join(format!(
            "lookbook-shell-{name}-{}",
            std::process::id()
        ));
        ShellPaths {
            output_dir: dir.clone(),
            export_dir: dir,
        }
    }

    async fn run_script(studio: &Studio<FakeService>, script: &'static str, paths: &ShellPaths) {
        run_shell_with(studio.clone(), BufReader::new(script.as_bytes()), paths.clone())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn quit_waits_for_the_pending_generation() {
        let studio = slow_studio();
        let paths = scratch_paths("quit");
        run_script(&studio, "generate\nquit\n", &paths).await;

        assert!(!studio.snapshot().generating);
        assert!(studio.result_image().is_some());
        let saved = std::fs::read_dir(&paths.output_dir).unwrap().count();
        assert_eq!(saved, 1);
        let _ = std::fs::remove_dir_all(&paths.output_dir);
    }

    #[tokio::test]
    async fn end_of_input_waits_for_the_pending_generation() {
        let studio = slow_studio();
        let paths = scratch_paths("eof");
        run_script(&studio, "generate\n", &paths).await;

        assert!(!studio.snapshot().generating);
        assert_eq!(studio.result_image().map(|image| image.dimensions().unwrap()), Some((16, 9)));
        let _ = std::fs::remove_dir_all(&paths.output_dir);
    }

    #[tokio::test]
    async fn repeated_generate_does_not_start_a_second_task() {
        let studio = slow_studio();
        let paths = scratch_paths("repeat");
        run_script(&studio, "generate\ngenerate\n", &paths).await;

        let service = studio.service_for_tests();
        assert_eq!(service.call_count(), 1);
        let _ = std::fs::remove_dir_all(&paths.output_dir);
    }

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            parse_shell_line("  brief  Walking in the rain "),
            Some(ShellCommand::Brief("Walking in the rain".to_string()))
        );
        assert_eq!(
            parse_shell_line("export 16:9"),
            Some(ShellCommand::Export("16:9".to_string()))
        );
        assert_eq!(parse_shell_line("REFINE"), Some(ShellCommand::Generate));
        assert_eq!(parse_shell_line("   "), None);
        assert_eq!(
            parse_shell_line("paint now"),
            Some(ShellCommand::Unknown("paint".to_string()))
        );
    }
}
