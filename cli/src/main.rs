//! Doppel CLI - drives the portrait wizard from a terminal prompt.
//!
//! The binary is a thin view layer: it reads commands from stdin, raises
//! the matching session events, and renders whatever step the session is
//! in after each one. Side-effecting events (`pay`, `recompose`) hand back
//! a ticket which is run through the engine pipelines inline, with the
//! outcome fed straight back into the session.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use doppel_engine::session::{Notice, RecomposeSlot, StepState};
use doppel_engine::{
    DoppelConfig, Photo, WizardSession, WizardSettings, codec, pipeline, save_artifact_as,
};
use doppel_gateway::GeminiClient;
use doppel_types::{CoinPack, ImageArtifact};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::default());

    let (log_file, init_warnings) = open_doppel_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // If we can't open a log file, prefer "no logs" over interleaving log
    // lines with the interactive prompt.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_doppel_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let candidates = doppel_log_file_candidates();
    let mut warnings = Vec::new();

    for candidate in candidates {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn doppel_log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.doppel/logs/doppel.log
    if let Some(config_path) = DoppelConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("doppel.log"));
    }

    // Fallback: ./.doppel/logs/doppel.log (useful in constrained environments)
    candidates.push(PathBuf::from(".doppel").join("logs").join("doppel.log"));

    candidates
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = DoppelConfig::load()?;
    let api_key = config.google_api_key().context(
        "no Google API key configured; set GEMINI_API_KEY or api_keys.google in config",
    )?;

    let mut client = GeminiClient::new(api_key);
    if let Some(model) = &config.app.model {
        client = client.with_model(model);
    }

    let mut session = WizardSession::with_settings(WizardSettings {
        starting_coins: config.wizard.starting_coins,
        recompose_cost: config.wizard.recompose_cost,
    });

    println!("doppel - AI twin portrait wizard. Type 'help' for commands.");
    render(&session);

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let args: Vec<&str> = parts.collect();

        match command {
            "quit" | "q" | "exit" => break,
            "help" => {
                print_help();
                continue;
            }
            "restart" => session.restart(),
            _ => {
                if let Err(err) = handle_command(&mut session, &client, command, &args).await {
                    println!("error: {err}");
                }
            }
        }
        render(&session);
    }

    Ok(())
}

async fn handle_command(
    session: &mut WizardSession,
    client: &GeminiClient,
    command: &str,
    args: &[&str],
) -> Result<()> {
    match command {
        "add" => {
            if args.is_empty() {
                anyhow::bail!("usage: add <image-file>...");
            }
            let photos = args
                .iter()
                .map(|arg| Photo::from_path(Path::new(arg)))
                .collect::<Result<Vec<_>, _>>()?;
            let outcome = session.add_photos(photos)?;
            println!("added {} photo(s)", outcome.added);
        }
        "remove" => {
            let ordinal = parse_ordinal(args, "remove <number>")?;
            session.remove_photo(ordinal - 1)?;
        }
        "next" => session.proceed_to_payment()?,
        "back" => session.back_to_upload()?,
        "pay" => {
            let ticket = session.confirm_payment(args.first().copied())?;
            println!("Creating your AI twin, this may take a minute...");
            let outcome = pipeline::run_generation(client, &ticket).await;
            session.apply_generation(ticket.token, outcome);
        }
        "save" => session.save_and_continue()?,
        "download" => {
            let dir = args.first().copied().unwrap_or(".");
            for line in download_gallery(session, Path::new(dir))? {
                println!("{line}");
            }
        }
        "buy" => {
            let pack = match args.first().copied() {
                Some("starter") => CoinPack::Starter,
                Some("creator") => CoinPack::Creator,
                _ => anyhow::bail!("usage: buy starter|creator"),
            };
            let balance = session.purchase(pack)?;
            println!("{} - balance is now {balance} coins", pack.label());
        }
        "recompose" => {
            let Some(arg) = args.first().copied() else {
                anyhow::bail!("usage: recompose <gallery-number|image-file>");
            };
            let reference = recompose_reference(session, arg)?;
            let ticket = session.begin_recompose(&reference)?;
            println!("Recreating with your AI twin...");
            let outcome = pipeline::run_recompose(client, &ticket).await;
            session.apply_recompose(ticket.token, outcome);
        }
        other => anyhow::bail!("unknown command '{other}'; type 'help'"),
    }
    Ok(())
}

/// Parse a 1-based ordinal argument. Zero is rejected rather than clamped.
fn parse_ordinal(args: &[&str], usage: &str) -> Result<usize> {
    args.first()
        .and_then(|arg| arg.parse().ok())
        .filter(|ordinal| *ordinal >= 1)
        .with_context(|| format!("usage: {usage}"))
}

/// Resolve a recompose reference: a bare number picks a gallery image,
/// anything else is loaded from disk as the user's own reference photo.
fn recompose_reference(session: &WizardSession, arg: &str) -> Result<String> {
    if let Ok(index) = arg.parse::<usize>() {
        return gallery_uri(session, index);
    }

    let photo = Photo::from_path(arg)?;
    let encoded = codec::encode(&photo)?;
    Ok(format!(
        "data:{};base64,{}",
        encoded.mime(),
        encoded.payload()
    ))
}

/// Data URI of the `index`-th (1-based) gallery image.
fn gallery_uri(session: &WizardSession, index: usize) -> Result<String> {
    let StepState::Subscribe { twin, .. } = session.state() else {
        anyhow::bail!("no gallery yet");
    };
    index
        .checked_sub(1)
        .and_then(|slot| twin.gallery.images().get(slot))
        .map(|artifact| artifact.as_uri().to_string())
        .with_context(|| format!("no gallery image {index}"))
}

/// Everything downloadable right now: the four gallery portraits plus, once
/// a recompose has settled, the recreated image.
fn downloadable_artifacts(session: &WizardSession) -> Result<Vec<(String, ImageArtifact)>> {
    let (gallery, slot) = match session.state() {
        StepState::Results { twin } => (&twin.gallery, None),
        StepState::Subscribe { twin, recompose } => (&twin.gallery, Some(recompose)),
        _ => anyhow::bail!("no gallery yet"),
    };

    let mut artifacts: Vec<(String, ImageArtifact)> = gallery
        .iter()
        .enumerate()
        .map(|(index, artifact)| (format!("ai-twin-{}.jpg", index + 1), artifact.clone()))
        .collect();

    if let Some(RecomposeSlot::Ready(artifact)) = slot {
        artifacts.push(("ai-twin-recreated.jpg".to_string(), artifact.clone()));
    }

    Ok(artifacts)
}

/// Save every downloadable artifact, reporting one line per image. A failed
/// write falls back to printing the image as a data URI so the result is
/// never stranded.
fn download_gallery(session: &WizardSession, dir: &Path) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for (name, artifact) in downloadable_artifacts(session)? {
        match save_artifact_as(&artifact, &name, dir) {
            Ok(path) => lines.push(format!("saved {}", path.display())),
            Err(err) => {
                tracing::warn!(%err, name, "Falling back to inline image output");
                lines.push(format!("could not save {name}: {err}"));
                lines.push(format!("{name}: {}", artifact.as_uri()));
            }
        }
    }
    Ok(lines)
}

fn render(session: &WizardSession) {
    println!();
    println!(
        "== {} == ({} coins)",
        session.step().name(),
        session.balance()
    );

    match session.state() {
        StepState::Upload { photos, notice } => {
            println!("{} photo(s) selected (5-10 required)", photos.len());
            for (index, photo) in photos.iter().enumerate() {
                println!("  {}. {}", index + 1, photo.path().display());
            }
            if let Some(notice) = notice {
                match notice {
                    Notice::Error(message) => println!("! {message}"),
                    Notice::Warning(message) => println!("~ {message}"),
                }
            }
            println!("commands: add, remove, next");
        }
        StepState::Payment { photos, .. } => {
            println!("{} photo(s) ready. One-time creation fee.", photos.len());
            println!("commands: pay [promo-code], back");
        }
        StepState::Generating { .. } => {
            println!("working...");
        }
        StepState::Results { twin } => {
            println!("Your AI twin is ready: {}", twin.description);
            println!("{} portraits generated", twin.gallery.images().len());
            println!("commands: download [dir], save, restart");
        }
        StepState::Subscribe { recompose, .. } => {
            match recompose {
                RecomposeSlot::Idle => {}
                RecomposeSlot::Pending { .. } => println!("recreating..."),
                RecomposeSlot::Ready(_) => {
                    println!("recreated image ready; 'download' saves it as ai-twin-recreated.jpg");
                }
                RecomposeSlot::Failed(message) => println!("! {message}"),
            }
            println!(
                "packs: starter ({} for {}), creator ({} for {})",
                CoinPack::Starter.coins(),
                CoinPack::Starter.price(),
                CoinPack::Creator.coins(),
                CoinPack::Creator.price(),
            );
            println!(
                "commands: buy starter|creator, recompose <n|file>, download [dir], restart"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doppel_engine::session::TwinProfile;
    use doppel_types::{Gallery, ImageMime, TwinDescription};

    fn artifact() -> ImageArtifact {
        ImageArtifact::from_png_payload("aGVsbG8=").unwrap()
    }

    fn session_at_subscribe() -> WizardSession {
        let mut session = WizardSession::new();
        let photos = (0..5)
            .map(|_| Photo::from_bytes(vec![0xFF, 0xD8, 0xFF], ImageMime::Jpeg).unwrap())
            .collect();
        session.add_photos(photos).unwrap();
        session.proceed_to_payment().unwrap();
        let ticket = session.confirm_payment(None).unwrap();
        session.apply_generation(
            ticket.token,
            Ok(TwinProfile {
                description: TwinDescription::new("short dark hair").unwrap(),
                gallery: Gallery::new(vec![artifact(); 4]).unwrap(),
            }),
        );
        session.save_and_continue().unwrap();
        session
    }

    #[test]
    fn recompose_reference_accepts_gallery_ordinal() {
        let session = session_at_subscribe();
        let uri = recompose_reference(&session, "1").unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn recompose_reference_loads_a_local_photo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.jpg");
        std::fs::write(&path, b"refdata").unwrap();

        let mut session = session_at_subscribe();
        let uri = recompose_reference(&session, path.to_str().unwrap()).unwrap();
        assert_eq!(uri, "data:image/jpeg;base64,cmVmZGF0YQ==");

        // The session accepts the encoded reference end to end.
        session.begin_recompose(&uri).unwrap();
    }

    #[test]
    fn ordinal_zero_is_rejected_not_clamped() {
        let session = session_at_subscribe();
        assert!(recompose_reference(&session, "0").is_err());
        assert!(parse_ordinal(&["0"], "remove <number>").is_err());
        assert_eq!(parse_ordinal(&["2"], "remove <number>").unwrap(), 2);
    }

    #[test]
    fn out_of_range_gallery_ordinal_is_rejected() {
        let session = session_at_subscribe();
        assert!(recompose_reference(&session, "5").is_err());
    }

    #[test]
    fn download_includes_the_recreated_image() {
        let mut session = session_at_subscribe();
        let ticket = session.begin_recompose("data:image/jpeg;base64,cmVm").unwrap();
        session.apply_recompose(ticket.token, Ok(artifact()));

        let dir = tempfile::tempdir().unwrap();
        let lines = download_gallery(&session, dir.path()).unwrap();
        assert_eq!(lines.len(), 5);
        for name in ["ai-twin-1.jpg", "ai-twin-4.jpg", "ai-twin-recreated.jpg"] {
            assert!(dir.path().join(name).exists(), "missing {name}");
        }
    }

    #[test]
    fn download_without_recompose_saves_only_the_gallery() {
        let session = session_at_subscribe();
        let dir = tempfile::tempdir().unwrap();

        let lines = download_gallery(&session, dir.path()).unwrap();
        assert_eq!(lines.len(), 4);
        assert!(!dir.path().join("ai-twin-recreated.jpg").exists());
    }

    #[test]
    fn failed_save_falls_back_to_inline_uri() {
        let session = session_at_subscribe();

        let lines = download_gallery(&session, Path::new("/nonexistent/doppel")).unwrap();
        assert_eq!(lines.len(), 8, "one failure line plus one fallback line each");
        assert!(lines[0].starts_with("could not save ai-twin-1.jpg"));
        assert!(lines[1].contains("data:image/png;base64,aGVsbG8="));
    }
}

fn print_help() {
    println!("  add <file>...        select photos (jpeg or png)");
    println!("  remove <n>           remove the n-th selected photo");
    println!("  next | back          move between upload and payment");
    println!("  pay [promo]          confirm payment and generate the twin");
    println!("  save                 keep the results and continue");
    println!("  download [dir]       save gallery images as ai-twin-<n>.jpg");
    println!("  buy starter|creator  purchase a coin pack");
    println!("  recompose <n|file>   recreate a gallery image or your own photo (costs coins)");
    println!("  restart              start over");
    println!("  quit                 exit");
}
