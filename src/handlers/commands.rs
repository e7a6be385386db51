use std::path::PathBuf;

use anyhow::{anyhow, Result};
use tracing::info;

use crate::config::CONFIG;
use crate::llm::media::load_image_asset;
use crate::llm::ContentService;
use crate::studio::crop::export_image;
use crate::studio::presets::{shot_types_for, suggested_briefs};
use crate::studio::{save_generated, CropAspect, ShotType, Studio};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Studio,
    Generate(GenerateArgs),
    Classify { hero: String },
    Export(ExportArgs),
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateArgs {
    pub hero: String,
    pub inspiration: Option<String>,
    pub brief: Option<String>,
    pub shot: ShotType,
    pub prior: Option<String>,
    pub out_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportArgs {
    pub image: String,
    pub aspect: CropAspect,
    pub out_dir: PathBuf,
}

pub fn usage() -> &'static str {
    "Usage:\n  \
     lookbook [studio]\n  \
     lookbook generate --hero <path|url> [--inspiration <path|url>] [--brief <text>] [--shot model|product] [--prior <path|url>] [--out <dir>]\n  \
     lookbook classify --hero <path|url>\n  \
     lookbook export --image <path|url> --aspect 1:1|9:16|16:9 [--out <dir>]"
}

fn take_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

pub fn parse_command(args: &[String]) -> Result<Command> {
    let Some(name) = args.get(1).map(String::as_str) else {
        return Ok(Command::Studio);
    };

    let mut hero = None;
    let mut inspiration = None;
    let mut brief = None;
    let mut shot = ShotType::Model;
    let mut prior = None;
    let mut image = None;
    let mut aspect = None;
    let mut out_dir = None;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--hero" => hero = Some(take_value(args, &mut index, "--hero")?.to_string()),
            "--inspiration" => {
                inspiration = Some(take_value(args, &mut index, "--inspiration")?.to_string())
            }
            "--brief" => brief = Some(take_value(args, &mut index, "--brief")?.to_string()),
            "--shot" => {
                let value = take_value(args, &mut index, "--shot")?;
                shot = ShotType::parse(value)
                    .ok_or_else(|| anyhow!("Invalid --shot value: {value} (expected model or product)"))?;
            }
            "--prior" => prior = Some(take_value(args, &mut index, "--prior")?.to_string()),
            "--image" => image = Some(take_value(args, &mut index, "--image")?.to_string()),
            "--aspect" => {
                let value = take_value(args, &mut index, "--aspect")?;
                aspect = Some(
                    CropAspect::parse(value)
                        .ok_or_else(|| anyhow!("Invalid --aspect value: {value} (expected 1:1, 9:16 or 16:9)"))?,
                );
            }
            "--out" => out_dir = Some(PathBuf::from(take_value(args, &mut index, "--out")?)),
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(anyhow!("Unknown argument: {other}\n{}", usage())),
        }
        index += 1;
    }

    match name {
        "studio" => Ok(Command::Studio),
        "help" | "--help" | "-h" => Ok(Command::Help),
        "generate" => Ok(Command::Generate(GenerateArgs {
            hero: hero.ok_or_else(|| anyhow!("--hero is required"))?,
            inspiration,
            brief,
            shot,
            prior,
            out_dir: out_dir.unwrap_or_else(|| CONFIG.output_dir.clone()),
        })),
        "classify" => Ok(Command::Classify {
            hero: hero.ok_or_else(|| anyhow!("--hero is required"))?,
        }),
        "export" => Ok(Command::Export(ExportArgs {
            image: image.ok_or_else(|| anyhow!("--image is required"))?,
            aspect: aspect.ok_or_else(|| anyhow!("--aspect is required"))?,
            out_dir: out_dir.unwrap_or_else(|| CONFIG.export_dir.clone()),
        })),
        other => Err(anyhow!("Unknown command: {other}\n{}", usage())),
    }
}

pub async fn generate_handler<S: ContentService>(studio: &Studio<S>, args: GenerateArgs) -> Result<()> {
    if let Some(err) = studio.config_error() {
        return Err(anyhow!("{err}"));
    }

    let hero = load_image_asset(&args.hero).await?;
    let ticket = studio.set_hero(hero);
    if args.shot == ShotType::Product {
        let category = studio.classify_hero(ticket).await;
        info!("Hero classified as {:?} before product shot", category);
    }
    studio.select_shot(args.shot)?;

    if let Some(source) = args.inspiration.as_deref() {
        studio.set_inspiration(Some(load_image_asset(source).await?));
    }
    if let Some(source) = args.prior.as_deref() {
        studio.adopt_result(load_image_asset(source).await?);
    }
    if let Some(brief) = args.brief.as_deref() {
        studio.set_brief(brief);
    }

    let image = studio.generate().await?;
    let path = save_generated(&image, &args.out_dir).await?;
    println!("{}", path.display());
    Ok(())
}

pub async fn classify_handler<S: ContentService>(studio: &Studio<S>, hero: &str) -> Result<()> {
    let ticket = studio.set_hero(load_image_asset(hero).await?);
    let category = studio.classify_hero(ticket).await;
    let category = category.as_ref();

    match category {
        Some(category) if category.is_known() => println!("Category: {category}"),
        Some(category) => println!("Category: {category} (not a known category)"),
        None => println!("Category: unavailable"),
    }
    let shots: Vec<&str> = shot_types_for(category)
        .iter()
        .map(|shot| shot.label())
        .collect();
    println!("Shot types: {}", shots.join(", "));
    for brief in suggested_briefs(category) {
        println!("  - {brief}");
    }
    Ok(())
}

pub async fn export_handler(args: ExportArgs) -> Result<()> {
    let image = load_image_asset(&args.image).await?;
    let path = export_image(&image, args.aspect, &args.out_dir).await?;
    println!("{}", path.display());
    Ok(())
}
