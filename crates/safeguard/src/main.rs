//! `safeguard` - CLI for the power button emergency alert
//!
//! This binary runs the press listener in the foreground and manages the
//! local alert store.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use safeguard::cli::{
    AlertCommand, AlertsCommand, CategoryCommand, Cli, Command, ConfigCommand, GroupCommand,
    HistoryCommand, ListenCommand, OutputFormat, SubjectCommand,
};
use safeguard::config::SourceKind;
use safeguard::haptics::LogHaptics;
use safeguard::location::LocationProvider;
use safeguard::source::LinePressSource;
use safeguard::trigger::EmergencySettings;
use safeguard::{
    init_logging, location, Alert, AlertCategory, AlertService, Config, EmergencyAlert, Group,
    PressListener, PressSource, Storage, Subject,
};

// Platform-specific imports using conditional compilation
#[cfg(target_os = "linux")]
use safeguard_linux as platform;

#[cfg(not(target_os = "linux"))]
mod platform {
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }

    pub fn platform_name() -> &'static str {
        std::env::consts::OS
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let result = runtime.block_on(run(cli));

    // A stdin read blocks its worker thread until the next line arrives
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Validation reports its own load errors
    if let Command::Config(ConfigCommand::Validate { file }) = cli.command {
        validate_config(file.or(cli.config));
        return Ok(());
    }

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Listen(cmd) => handle_listen(&config, &cmd).await,
        Command::Config(cmd) => handle_config(&config, cmd),
        Command::Status(cmd) => handle_status(&config, cmd.json),
        command => {
            let service = open_service(&config)?;
            match command {
                Command::Alert(cmd) => handle_alert(&config, &service, cmd).await,
                Command::Alerts(AlertsCommand::Active { format }) => {
                    print_alerts(&service, &service.active_alerts()?, format)
                }
                Command::History(cmd) => handle_history(&service, cmd),
                Command::Subject(cmd) => handle_subject(&service, cmd),
                Command::Group(cmd) => handle_group(&service, cmd),
                Command::Category(cmd) => handle_category(&service, cmd),
                Command::Listen(_) | Command::Config(_) | Command::Status(_) => Ok(()),
            }
        }
    }
}

fn open_service(config: &Config) -> anyhow::Result<AlertService> {
    let storage = Storage::open(config.database_path())?;
    Ok(AlertService::new(storage))
}

fn require_subject(config: &Config) -> anyhow::Result<&str> {
    config
        .identity
        .subject_id
        .as_deref()
        .ok_or_else(|| safeguard::Error::NotAuthenticated.into())
}

async fn handle_listen(config: &Config, cmd: &ListenCommand) -> anyhow::Result<()> {
    platform::init().map_err(|e| anyhow::anyhow!("platform init failed: {e}"))?;

    let service = open_service(config)?;
    if config.identity.subject_id.is_none() {
        warn!("identity.subject_id is not set; detected gestures will not raise alerts");
    }

    let action = EmergencyAlert::new(
        service,
        location::from_config(config),
        Box::new(LogHaptics),
        EmergencySettings::from_config(config),
    );

    let kind = cmd.source.map_or(config.source.kind, SourceKind::from);
    let mut source = build_source(kind, config)?;
    let source_stop = source.stop_handle();

    let (tx, rx) = mpsc::channel(64);
    let listener = PressListener::from_config(config, Arc::new(action)).spawn(rx);

    if kind == SourceKind::Stdin {
        println!(
            "Press Enter {} times, at most {} ms apart, to raise an alert. Ctrl-C to quit.",
            config.detector.required_presses, config.detector.max_gap_ms
        );
    }

    let source_task = tokio::spawn(async move { source.start(tx).await });

    let control = listener.control();
    let interrupt_stop = source_stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            interrupt_stop.stop();
            control.stop();
        }
    });

    let status = listener.join().await?;
    source_stop.stop();

    match source_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e).context("press source failed"),
        Err(e) => bail!("press source task failed: {e}"),
    }

    info!(
        presses = status.presses_seen,
        triggers = status.triggers_fired,
        failures = status.trigger_failures,
        "Listener finished"
    );
    Ok(())
}

fn build_source(kind: SourceKind, config: &Config) -> anyhow::Result<Box<dyn PressSource>> {
    match kind {
        SourceKind::Stdin => Ok(Box::new(LinePressSource::stdin())),
        #[cfg(target_os = "linux")]
        SourceKind::Acpi => Ok(Box::new(safeguard::source::AcpiPressSource::from_config(
            &config.source,
        )?)),
        #[cfg(not(target_os = "linux"))]
        SourceKind::Acpi => {
            let _ = config;
            bail!("the acpi source is only available on Linux")
        }
    }
}

async fn handle_alert(
    config: &Config,
    service: &AlertService,
    cmd: AlertCommand,
) -> anyhow::Result<()> {
    let subject_id = require_subject(config)?;

    match cmd {
        AlertCommand::Send {
            message,
            latitude,
            longitude,
            json,
        } => {
            let location = match latitude.zip(longitude) {
                Some((lat, lon)) => Some(safeguard::GeoPoint::new(lat, lon)),
                None => location::from_config(config).last_known().await?,
            };
            let message = message.unwrap_or_else(|| config.alert.manual_message.clone());
            let alert = service.send_manual_alert(subject_id, location, &message)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&alert)?);
            } else {
                println!("Alert sent: {}", alert.id);
            }
        }
        AlertCommand::End => match service.end_current_alert(subject_id)? {
            Some(alert) => println!("Alert ended: {}", alert.id),
            None => println!("No open alert."),
        },
        AlertCommand::Current { json } => {
            let current = service.current_alert(subject_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&current)?);
            } else if let Some(alert) = current {
                print_alert_detail(service, &alert)?;
            } else {
                println!("No open alert.");
            }
        }
    }
    Ok(())
}

fn handle_history(service: &AlertService, cmd: HistoryCommand) -> anyhow::Result<()> {
    match cmd {
        HistoryCommand::List { limit, format } => {
            print_alerts(service, &service.history(limit)?, format)?;
        }
        HistoryCommand::Terminate { id, message } => {
            let alert = service.terminate(&id, &message)?;
            println!("Alert terminated: {}", alert.id);
        }
        HistoryCommand::Edit(edit) => {
            let update = edit.to_update();
            if update.is_empty() {
                bail!("nothing to change; pass at least one field to edit");
            }
            let alert = service.update(&edit.id, &update)?;
            print_alert_detail(service, &alert)?;
        }
        HistoryCommand::Delete { id } => {
            service.delete(&id)?;
            println!("Alert deleted: {id}");
        }
    }
    Ok(())
}

fn handle_subject(service: &AlertService, cmd: SubjectCommand) -> anyhow::Result<()> {
    match cmd {
        SubjectCommand::Add {
            id,
            name,
            last_name,
            group,
            role,
        } => {
            let subject = Subject {
                id,
                name,
                last_name,
                group_id: group,
                role,
            };
            service.with_storage(|s| s.upsert_subject(&subject))?;
            println!("Saved subject {} ({})", subject.id, subject.display_name());
        }
        SubjectCommand::List { group, format } => {
            let subjects = service.with_storage(|s| s.list_subjects(group.as_deref()))?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&subjects)?);
                return Ok(());
            }
            let group_names =
                service.group_names(subjects.iter().filter_map(|s| s.group_id.as_deref()))?;
            for subject in &subjects {
                let group = subject
                    .group_id
                    .as_ref()
                    .and_then(|id| group_names.get(id))
                    .map_or(safeguard::service::NO_GROUP_NAME, String::as_str);
                match format {
                    OutputFormat::Table => println!(
                        "{:<24} {:<28} {:<20} {}",
                        subject.id,
                        subject.display_name(),
                        group,
                        subject.role
                    ),
                    _ => println!("{}: {} [{group}]", subject.id, subject.display_name()),
                }
            }
        }
    }
    Ok(())
}

fn handle_group(service: &AlertService, cmd: GroupCommand) -> anyhow::Result<()> {
    match cmd {
        GroupCommand::Add { id, name } => {
            service.with_storage(|s| s.upsert_group(&Group { id, name }))?;
            println!("Saved group.");
        }
        GroupCommand::List { format } => {
            let groups = service.with_storage(Storage::list_groups)?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                for group in &groups {
                    println!("{:<24} {}", group.id, group.name);
                }
            }
        }
    }
    Ok(())
}

fn handle_category(service: &AlertService, cmd: CategoryCommand) -> anyhow::Result<()> {
    match cmd {
        CategoryCommand::Add {
            name,
            description,
            color,
            icon,
        } => {
            let category = AlertCategory {
                description,
                color,
                icon,
                ..AlertCategory::new(name)
            };
            service.with_storage(|s| s.upsert_category(&category))?;
            println!("Saved category {} ({})", category.name, category.id);
        }
        CategoryCommand::List { format } => {
            let categories = service.with_storage(Storage::list_categories)?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&categories)?);
            } else {
                for category in &categories {
                    println!(
                        "{:<38} {:<20} {}",
                        category.id, category.name, category.description
                    );
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug)]
struct AlertNames {
    subjects: HashMap<String, String>,
    groups: HashMap<String, String>,
    categories: HashMap<String, String>,
}

impl AlertNames {
    fn resolve(service: &AlertService, alerts: &[Alert]) -> anyhow::Result<Self> {
        Ok(Self {
            subjects: service.subject_names(alerts.iter().map(|a| a.subject_id.as_str()))?,
            groups: service.group_names(alerts.iter().map(|a| a.group_id.as_str()))?,
            categories: service.category_names(alerts.iter().map(|a| a.category_id.as_str()))?,
        })
    }

    fn get<'a>(map: &'a HashMap<String, String>, id: &str) -> &'a str {
        map.get(id).map_or("", String::as_str)
    }
}

fn print_alerts(service: &AlertService, alerts: &[Alert], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(alerts)?);
        return Ok(());
    }
    if alerts.is_empty() {
        println!("No alerts.");
        return Ok(());
    }

    let names = AlertNames::resolve(service, alerts)?;
    if format == OutputFormat::Table {
        println!(
            "{:<36}  {:<19}  {:<10}  {:<20}  {:<16}  {:<16}  LOCATION",
            "ID", "CREATED", "STATUS", "SUBJECT", "GROUP", "CATEGORY"
        );
    }

    for alert in alerts {
        let created = alert
            .created_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S");
        let location = alert
            .location
            .map_or_else(|| "-".to_string(), |point| point.to_string());
        let subject = AlertNames::get(&names.subjects, &alert.subject_id);
        let group = AlertNames::get(&names.groups, &alert.group_id);
        let category = AlertNames::get(&names.categories, &alert.category_id);

        match format {
            OutputFormat::Table => println!(
                "{:<36}  {created:<19}  {:<10}  {subject:<20}  {group:<16}  {category:<16}  {location}",
                alert.id, alert.status
            ),
            _ => println!(
                "{} [{}] {created} {subject} ({group}) {category} @ {location}: {}",
                alert.id, alert.status, alert.message
            ),
        }
    }
    Ok(())
}

fn print_alert_detail(service: &AlertService, alert: &Alert) -> anyhow::Result<()> {
    println!("Alert {}", alert.id);
    println!("  Status:       {}", alert.status);
    println!("  Subject:      {}", service.subject_name(&alert.subject_id)?);
    println!("  Group:        {}", service.group_name(&alert.group_id)?);
    println!("  Category:     {}", service.category_name(&alert.category_id)?);
    println!(
        "  Created:      {}",
        alert.created_at.with_timezone(&chrono::Local).to_rfc2822()
    );
    if let Some(ended_at) = alert.ended_at {
        println!(
            "  Ended:        {}",
            ended_at.with_timezone(&chrono::Local).to_rfc2822()
        );
    }
    match alert.location {
        Some(point) => println!("  Location:     {point}"),
        None => println!("  Location:     unknown"),
    }
    println!("  Message:      {}", alert.message);
    println!("  Observation:  {}", alert.observation);
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let service = open_service(config)?;
    let stats = service.with_storage(Storage::stats)?;
    let current = match config.identity.subject_id.as_deref() {
        Some(subject_id) => service.current_alert(subject_id)?,
        None => None,
    };

    if json {
        let status = serde_json::json!({
            "platform": platform::platform_name(),
            "database_path": config.database_path(),
            "subject_id": config.identity.subject_id,
            "source": config.source.kind,
            "total_alerts": stats.total_alerts,
            "active_alerts": stats.active_alerts,
            "oldest_alert": stats.oldest_alert,
            "newest_alert": stats.newest_alert,
            "db_size_bytes": stats.db_size_bytes,
            "current_alert": current.as_ref().map(|a| &a.id),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("safeguard status");
        println!("----------------");
        println!("Platform:      {}", platform::platform_name());
        println!("Database:      {}", config.database_path().display());
        println!(
            "Subject:       {}",
            config.identity.subject_id.as_deref().unwrap_or("(not signed in)")
        );
        println!(
            "Gesture:       {} presses, {} ms apart",
            config.detector.required_presses, config.detector.max_gap_ms
        );
        println!("Alerts:        {} total, {} open", stats.total_alerts, stats.active_alerts);
        if let Some(newest) = stats.newest_alert {
            println!(
                "Last alert:    {}",
                newest.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
            );
        }
        println!("DB size:       {} bytes", stats.db_size_bytes);
        match current {
            Some(alert) => println!("Your alert:    OPEN ({})", alert.id),
            None => println!("Your alert:    none"),
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Detector]");
                println!("  Required presses:   {}", config.detector.required_presses);
                println!("  Max gap (ms):       {}", config.detector.max_gap_ms);
                match config.trigger_timeout() {
                    Some(timeout) => println!("  Trigger timeout:    {} ms", timeout.as_millis()),
                    None => println!("  Trigger timeout:    none"),
                }
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Identity]");
                println!(
                    "  Subject:            {}",
                    config.identity.subject_id.as_deref().unwrap_or("(none)")
                );
                println!();
                println!("[Alert]");
                println!("  Category:           {}", config.alert.category_name);
                println!("  Observation:        {}", config.alert.trigger_observation);
                println!("  Manual message:     {}", config.alert.manual_message);
                println!("  Pulse (ms):         {}", config.alert.haptic_pulse_ms);
                println!();
                println!("[Location]");
                match config.fixed_location() {
                    Some(point) => println!("  Fixed:              {point}"),
                    None => println!("  Fixed:              (none)"),
                }
                println!();
                println!("[Source]");
                println!("  Kind:               {:?}", config.source.kind);
                println!(
                    "  acpid socket:       {}",
                    config.source.acpi_socket_path.display()
                );
                println!("  acpid pattern:      {}", config.source.acpi_event_pattern);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => validate_config(file),
    }
    Ok(())
}

fn validate_config(file: Option<std::path::PathBuf>) {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => println!("Configuration is valid."),
        Err(e) => println!("Configuration error: {e}"),
    }
}
