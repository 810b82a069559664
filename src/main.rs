//! Drive simulated docker labs from the command line
mod cli;

use crate::cli::{Action, Config, SettingsAction, configure_cli};
use docklab::compose::{self, ServiceDescriptor};
use docklab::config::Settings;
use docklab::domain::clock::{LatencyProfile, TokioClock};
use docklab::domain::labs::models::lab::{CreateLabRequest, Lab};
use docklab::domain::labs::models::template::Template;
use docklab::domain::labs::ports::LabsService;
use docklab::domain::labs::service::Service;
use docklab::install::{BuildEvent, InstallError, InstallSession, Pacing};
use docklab::logs::{LogFilter, LogViewer};
use docklab::outbound::api::LabApi;
use docklab::outbound::lab_memory::LabMemory;
use docklab::shell::{ShellSession, Submission};
use docklab::templates::{TemplateCatalog, TemplateQuery, builtin_templates};
use env_logger::Env;
use log::{error, info, warn};
use std::io::Write;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinSet;

type Labs = Service<LabMemory, TokioClock>;
type CliResult = Result<(), Box<dyn std::error::Error + 'static>>;

#[derive(Debug, Error)]
enum DocklabError {
    #[error("unknown template `{0}`")]
    UnknownTemplate(String),
    #[error("lab has no container named `{0}`")]
    UnknownContainer(String),
    #[error("lab has no containers")]
    NoContainers,
    #[error("no complete service (name and image) to generate compose text from")]
    NothingToGenerate,
}

#[tokio::main]
async fn main() -> CliResult {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let config = configure_cli();

    let latency = if config.fast {
        LatencyProfile::instant()
    } else {
        LatencyProfile::default()
    };
    let service = Service::new(LabMemory::default(), TokioClock, latency);
    let api = config.api.as_deref().map(LabApi::new).transpose()?;

    match &config.action {
        Action::Templates {
            search,
            category,
            sort_by,
        } => {
            let catalog = TemplateCatalog::new(load_templates(api.as_ref()).await);
            info!("categories: {}", catalog.categories().join(", "));
            let query = TemplateQuery {
                search: search.clone(),
                category: category.clone(),
                sort_by: *sort_by,
            };
            for template in catalog.query(&query) {
                println!(
                    "{:<18} {:<22} {:<12} {}",
                    template.id, template.name, template.category, template.description
                );
            }
        }
        Action::Labs { recent } => list_labs(&service, api.as_ref(), *recent).await?,
        Action::Compose { file, create } => {
            let text = std::fs::read_to_string(file)?;
            let descriptors: Vec<ServiceDescriptor> = serde_json::from_str(&text)?;
            let generated = compose::generate(&descriptors).ok_or(DocklabError::NothingToGenerate)?;
            println!("{generated}");
            if let Some(name) = create {
                let lab = service
                    .create_lab(CreateLabRequest::new(name.as_str(), "", generated))
                    .await?;
                print_lab(&lab);
            }
        }
        Action::Install { template, start } => {
            let template = find_template(api.as_ref(), template).await?;
            install(&service, &config, template, *start).await?;
        }
        Action::Exec {
            template,
            container,
        } => {
            let template = find_template(api.as_ref(), template).await?;
            exec(&service, &config, &template, container.as_deref()).await?;
        }
        Action::Logs {
            template,
            level,
            search,
            follow,
        } => {
            let template = find_template(api.as_ref(), template).await?;
            let lab = service.install_template(&template).await?;
            let lab = service.start_lab(&lab.id).await?;
            let filter = LogFilter {
                level: *level,
                search: search.clone(),
            };
            let mut viewer = LogViewer::new(&lab, TokioClock);
            println!("{}", viewer.export(&filter));
            let counts = viewer.counts(&filter);
            info!(
                "shown {} | error {} | warn {} | info {} | debug {}",
                counts.all, counts.error, counts.warn, counts.info, counts.debug
            );
            for _ in 0..*follow {
                let entry = viewer.next().await;
                if filter.matches(entry) {
                    println!("{entry}");
                }
            }
        }
        Action::Settings(action) => settings(&config, action)?,
    }

    Ok(())
}

/// Templates from the API when configured, the built-in table otherwise or
/// when the fetch fails.
async fn load_templates(api: Option<&LabApi>) -> Vec<Template> {
    if let Some(api) = api {
        match api.fetch_templates().await {
            Ok(templates) => return templates,
            Err(e) => warn!("{e}, falling back to built-in templates"),
        }
    }
    builtin_templates()
}

async fn find_template(api: Option<&LabApi>, key: &str) -> Result<Template, DocklabError> {
    TemplateCatalog::new(load_templates(api).await)
        .find(key)
        .cloned()
        .ok_or_else(|| DocklabError::UnknownTemplate(key.to_string()))
}

fn print_lab(lab: &Lab) {
    println!(
        "{}  {}  [{}]  {}/{} running  created {}",
        lab.id,
        lab.name,
        lab.status,
        lab.running_containers(),
        lab.containers.len(),
        lab.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    for container in &lab.containers {
        println!(
            "    {:<24} {:<28} {:<8} {}",
            container.name,
            container.image,
            container.status.to_string(),
            container.ports.join(", ")
        );
    }
}

async fn list_labs(service: &Labs, api: Option<&LabApi>, recent: usize) -> CliResult {
    let fetched = match api {
        Some(api) => match api.fetch_labs().await {
            Ok(labs) => Some(labs),
            Err(e) => {
                error!("{e}");
                None
            }
        },
        None => None,
    };

    match fetched {
        Some(labs) => service.import_labs(labs).await,
        None => {
            // without an API, seed one lab per built-in template
            let mut installs = JoinSet::new();
            for template in builtin_templates() {
                let service = service.clone();
                installs.spawn(async move { service.install_template(&template).await });
            }
            while let Some(result) = installs.join_next().await {
                result??;
            }
        }
    }

    for lab in service.get_all_labs().await {
        print_lab(&lab);
    }
    let stats = service.stats().await;
    println!(
        "\n{} labs, {} running, {} running containers",
        stats.total_labs, stats.running_labs, stats.running_containers
    );
    let recent: Vec<String> = service
        .recent_labs(recent)
        .await
        .into_iter()
        .map(|lab| lab.name)
        .collect();
    println!("recent: {}", recent.join(", "));
    Ok(())
}

async fn install(service: &Labs, config: &Config, template: Template, start: bool) -> CliResult {
    let pacing = if config.fast {
        Pacing::instant()
    } else {
        Pacing::default()
    };
    let mut session = InstallSession::start(service.clone(), TokioClock, template, pacing);
    let Some(mut events) = session.take_events() else {
        return Ok(());
    };

    let (interrupt_tx, mut interrupted) = watch::channel(());
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })?;

    loop {
        tokio::select! {
            biased;
            Ok(()) = interrupted.changed() => {
                info!("Cancelling installation...");
                session.cancel();
            }
            event = events.recv() => match event {
                Some(BuildEvent::StepStarted(phase)) => println!("==> {}", phase.label()),
                Some(BuildEvent::Log(_, line)) => println!("    {line}"),
                Some(BuildEvent::StepCompleted(phase)) => {
                    println!("  ✓ {} ({}%)", phase.label(), session.progress().percent())
                }
                Some(BuildEvent::StepFailed(phase)) => println!("  ✗ {}", phase.label()),
                Some(BuildEvent::Finished(lab_id)) => println!("Lab {lab_id} is ready"),
                None => break,
            },
        }
    }

    match session.wait().await {
        Ok(lab) => {
            let lab = if start {
                service.start_lab(&lab.id).await?
            } else {
                lab
            };
            print_lab(&lab);
            Ok(())
        }
        Err(InstallError::Cancelled) => {
            warn!("Installation cancelled, no lab was created");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn exec(
    service: &Labs,
    config: &Config,
    template: &Template,
    container: Option<&str>,
) -> CliResult {
    let lab = service.install_template(template).await?;
    let lab = service.start_lab(&lab.id).await?;
    let target = match container {
        Some(name) => lab
            .containers
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DocklabError::UnknownContainer(name.to_string()))?,
        None => lab
            .containers
            .first()
            .ok_or(DocklabError::NoContainers)?,
    };

    let mut session = ShellSession::open(service, &lab.id, &target.id, TokioClock).await?;
    if config.fast {
        session = session.with_delay(Duration::ZERO);
    }

    let mut printed = 0;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let output = session.output();
        if output.len() < printed {
            printed = 0;
        }
        for line in &output[printed..] {
            println!("{line}");
        }
        printed = output.len();
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match session.submit(&line) {
            Ok(Submission::Pending) => {
                session.resolve().await;
            }
            Ok(Submission::Exit) => break,
            Ok(Submission::Cleared) | Ok(Submission::Ignored) => {}
            Err(e) => {
                error!("{e}");
                break;
            }
        }
    }
    session.close();
    Ok(())
}

fn settings(config: &Config, action: &SettingsAction) -> CliResult {
    let dir = config.state_dir.as_path();
    match action {
        SettingsAction::Show => {
            println!("{}", Settings::load_saved(dir)?.export_json()?);
        }
        SettingsAction::Export { out } => {
            let json = Settings::load_saved(dir)?.export_json()?;
            match out {
                Some(path) => {
                    std::fs::write(path, json)?;
                    info!("Settings exported to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        SettingsAction::Import { file } => {
            let text = std::fs::read_to_string(file)?;
            let mut settings = Settings::load_saved(dir)?;
            if let Err(e) = settings.import_json(&text) {
                error!("{e}");
                return Err(e.into());
            }
            settings.save(dir)?;
        }
        SettingsAction::Reset => {
            let mut settings = Settings::load_saved(dir)?;
            settings.reset();
            settings.save(dir)?;
        }
    }
    Ok(())
}
