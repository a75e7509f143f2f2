// UI layer: a menu-driven terminal surface using `dialoguer`.
// Every action resolves a fresh workspace handle, runs to completion and
// prints its outcome before the menu comes back.

use crate::api::Connector;
use crate::auth::{ClientFactory, CredentialKind, WorkspaceHandle};
use crate::config::{AppEnvironment, ExecutionMode};
use crate::listing::{ListingWorkflow, RemoteEntry};
use crate::logging::Logger;
use crate::upload::{BatchEvent, LocalFile, UploadWorkflow};
use crate::volume::DestinationAddress;
use anyhow::Result;
use crossterm::style::Stylize;
use dialoguer::{Confirm, Input, Password, Select};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::HeaderMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// State kept between menu actions. No handle lives here: each action
/// resolves its own.
pub struct App<C> {
    mode: ExecutionMode,
    env: AppEnvironment,
    headers: HeaderMap,
    catalog: String,
    schema: String,
    volume: String,
    factory: ClientFactory<C>,
    uploads: UploadWorkflow,
    listing: ListingWorkflow,
    logger: Logger,
}

impl<C: Connector> App<C> {
    pub fn new(env: AppEnvironment, headers: HeaderMap, connector: C, logger: &Logger) -> Self {
        App {
            mode: ExecutionMode::detect(&env),
            catalog: env.default_catalog.clone().unwrap_or_default(),
            schema: env.default_schema.clone().unwrap_or_default(),
            volume: env.default_volume.clone().unwrap_or_default(),
            env,
            headers,
            factory: ClientFactory::new(connector, logger),
            uploads: UploadWorkflow::new(logger),
            listing: ListingWorkflow::new(logger),
            logger: logger.scoped("volume_uploader::ui"),
        }
    }

    /// Resolve a handle for one action, reporting failures on screen.
    fn connect(&self) -> Option<WorkspaceHandle> {
        let spinner = spinner("Connecting to workspace...");
        let resolved = self
            .factory
            .resolve_client(self.mode, &self.headers, &self.env);
        spinner.finish_and_clear();
        match resolved {
            Ok(handle) => Some(handle),
            Err(e) => {
                println!("{}", format!("❌ {e}").red());
                None
            }
        }
    }
}

impl<C> App<C> {
    fn address(&self) -> Result<DestinationAddress, String> {
        DestinationAddress::new(&self.catalog, &self.schema, &self.volume).map_err(|e| e.to_string())
    }
}

/// Main interactive menu. Runs until the user chooses "Exit".
pub fn main_menu<C: Connector>(mut app: App<C>) -> Result<()> {
    println!("{}", "📁 Databricks Volume File Uploader".bold());
    println!("This app allows you to upload files to a Databricks Unity Catalog volume.\n");
    print_mode_banner(&app);

    if app.mode == ExecutionMode::Local && (app.env.host.is_none() || app.env.token.is_none()) {
        handle_credentials(&mut app)?;
    }
    if app.address().is_err() {
        handle_configure(&mut app)?;
    }

    loop {
        let mut items = vec![
            "Configure volume",
            "Upload files",
            "Refresh volume contents",
            "Test authentication",
            "Show debug information",
        ];
        if app.mode == ExecutionMode::Local {
            items.push("Set Databricks host and token");
        }
        items.push("Exit");

        println!();
        println!("Volume: {}", volume_label(&app).cyan());
        let selection = Select::new().items(&items).default(0).interact()?;
        match items[selection] {
            "Configure volume" => handle_configure(&mut app)?,
            "Upload files" => handle_upload(&app)?,
            "Refresh volume contents" => handle_refresh(&app),
            "Test authentication" => handle_test_auth(&app),
            "Show debug information" => {
                for line in app.env.debug_lines(&app.headers) {
                    println!("  {line}");
                }
            }
            "Set Databricks host and token" => handle_credentials(&mut app)?,
            _ => break,
        }
    }
    Ok(())
}

fn print_mode_banner<C: Connector>(app: &App<C>) {
    match app.mode {
        ExecutionMode::HostedApp => {
            println!(
                "{}",
                "Running as a Databricks App - authentication is automatic".green()
            );
            match app.factory.verify_forwarded_user(&app.headers, &app.env) {
                Some(verified) => {
                    println!("🔑 Using on-behalf-of-user authorization - actions will use your permissions");
                    match verified {
                        Ok(identity) => {
                            println!("{}", format!("Authenticated as: {}", identity.name()).green())
                        }
                        Err(reason) => println!(
                            "{}",
                            format!("Could not verify user identity: {reason}").yellow()
                        ),
                    }
                }
                None => println!("Using app service principal for authentication"),
            }
            app.logger.info(format_args!(
                "Using automatic authentication from Databricks App environment"
            ));
        }
        ExecutionMode::Local => {
            println!(
                "{}",
                "Running in local mode - authentication required".yellow()
            );
            println!("Note: When deployed as a Databricks App, authentication is handled automatically.");
        }
    }
}

fn volume_label<C>(app: &App<C>) -> String {
    match app.address() {
        Ok(address) => address.to_string(),
        Err(_) => "<not configured>".to_string(),
    }
}

/// Prompt for catalog, schema and volume.
fn handle_configure<C>(app: &mut App<C>) -> Result<()> {
    app.catalog = prompt_text("Catalog Name", &app.catalog)?;
    app.schema = prompt_text("Schema Name", &app.schema)?;
    app.volume = prompt_text("Volume", &app.volume)?;
    if let Err(e) = app.address() {
        println!("{}", e.yellow());
    }
    Ok(())
}

/// Local mode only: host and personal access token. The token prompt is
/// hidden and an empty answer keeps the current value.
fn handle_credentials<C>(app: &mut App<C>) -> Result<()> {
    let current_host = app.env.host.clone().unwrap_or_default();
    let host = prompt_text("Databricks Host", &current_host)?;
    if !host.is_empty() {
        app.logger.debug(format_args!("Using provided Databricks host: {host}"));
    }
    app.env.host = Some(host).filter(|h| !h.is_empty());

    let token = Password::new()
        .with_prompt("Databricks Token (leave empty to keep the current one)")
        .allow_empty_password(true)
        .interact()?;
    if !token.trim().is_empty() {
        app.env.token = Some(token.trim().to_string());
    }
    Ok(())
}

fn handle_upload<C: Connector>(app: &App<C>) -> Result<()> {
    let address = match app.address() {
        Ok(address) => address,
        Err(e) => {
            app.logger.warn(format_args!(
                "Upload attempted without specifying volume name"
            ));
            println!("{}", e.red());
            return Ok(());
        }
    };

    let paths = choose_files()?;
    if paths.is_empty() {
        println!("No files selected.");
        return Ok(());
    }
    let files: Vec<LocalFile> = paths.iter().map(|p| read_local_file(p)).collect();
    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    let prompt = format!("Upload {} to {}?", names.join(", "), address);
    if !Confirm::new().with_prompt(prompt).default(true).interact()? {
        return Ok(());
    }

    let Some(handle) = app.connect() else {
        return Ok(());
    };

    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} {msg}",
    )?);
    let outcomes = app
        .uploads
        .upload_batch(&handle, &address, &files, |event| match event {
            BatchEvent::Started { file_name, .. } => {
                bar.set_message(format!("Uploading {file_name}..."));
            }
            BatchEvent::Finished { outcome, .. } => {
                match &outcome.result {
                    Ok(path) => bar.println(format!(
                        "{}",
                        format!(
                            "✅ {} ({} bytes) uploaded successfully to {path}",
                            outcome.file_name, outcome.size
                        )
                        .green()
                    )),
                    Err(e) => bar.println(format!(
                        "{}",
                        format!("❌ Failed to upload {}: {e}", outcome.file_name).red()
                    )),
                }
                bar.inc(1);
            }
        });
    bar.finish_and_clear();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    let summary = format!(
        "Upload process completed! {} succeeded, {failed} failed.",
        outcomes.len() - failed
    );
    if failed == 0 {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.yellow());
    }
    Ok(())
}

fn handle_refresh<C: Connector>(app: &App<C>) {
    let address = match app.address() {
        Ok(address) => address,
        Err(e) => {
            println!("{}", e.yellow());
            return;
        }
    };
    let Some(handle) = app.connect() else {
        return;
    };
    match app.listing.list(&handle, &address) {
        Ok(entries) if entries.is_empty() => println!("The volume is empty."),
        Ok(entries) => {
            for line in render_table(&entries) {
                println!("{line}");
            }
            println!("{}", entry_summary(&entries));
        }
        Err(e) => println!(
            "{}",
            format!(
                "{e}. Make sure the volume exists and you have permissions to access it."
            )
            .yellow()
        ),
    }
}

fn handle_test_auth<C: Connector>(app: &App<C>) {
    if let Some(handle) = app.connect() {
        let via = match handle.kind() {
            CredentialKind::UserDelegated => "🔑 on-behalf-of-user".to_string(),
            other => other.to_string(),
        };
        println!(
            "{}",
            format!(
                "Authentication successful! Connected as: {} ({via})",
                handle.identity().name()
            )
            .green()
        );
    }
}

/// Let the user pick files with the native dialog or by typing paths.
fn choose_files() -> Result<Vec<PathBuf>> {
    let options = ["Type file paths", "Choose with file dialog"];
    let choice = Select::new()
        .with_prompt("Choose files to upload")
        .items(&options)
        .default(0)
        .interact()?;
    if choice == 1 {
        let picked = rfd::FileDialog::new()
            .set_title("Choose files to upload")
            .pick_files();
        return Ok(picked.unwrap_or_default());
    }
    let raw: String = Input::new()
        .with_prompt("File paths (comma-separated)")
        .allow_empty(true)
        .interact_text()?;
    Ok(parse_paths(&raw, dirs::home_dir().as_deref()))
}

fn prompt_text(prompt: &str, current: &str) -> Result<String> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .with_initial_text(current)
        .allow_empty(true)
        .interact_text()?;
    Ok(value.trim().to_string())
}

fn spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn read_local_file(path: &Path) -> LocalFile {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    match std::fs::read(path) {
        Ok(bytes) => LocalFile::new(name, bytes),
        Err(e) => LocalFile::unreadable(name, e.to_string()),
    }
}

/// Split a comma-separated list of paths, expanding a leading `~`.
fn parse_paths(raw: &str, home: Option<&Path>) -> Vec<PathBuf> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match (s.strip_prefix("~/"), home) {
            (Some(rest), Some(home)) => home.join(rest),
            _ if s == "~" && home.is_some() => home.map(Path::to_path_buf).unwrap_or_default(),
            _ => PathBuf::from(s),
        })
        .collect()
}

/// Name / Path / Size / Type columns, padded to the widest cell.
fn render_table(entries: &[RemoteEntry]) -> Vec<String> {
    let header = ["Name", "Path", "Size", "Type"];
    let rows: Vec<[&str; 4]> = entries
        .iter()
        .map(|e| [e.name.as_str(), e.path.as_str(), e.size_label.as_str(), e.type_label])
        .collect();
    let mut widths = header.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let line = |cells: [&str; 4]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let mut out = vec![line(header)];
    out.push(widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("  "));
    out.extend(rows.into_iter().map(line));
    out
}

fn entry_summary(entries: &[RemoteEntry]) -> String {
    let dirs = entries.iter().filter(|e| e.is_directory()).count();
    format!("{} files, {dirs} directories", entries.len() - dirs)
}
