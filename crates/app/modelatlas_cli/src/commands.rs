//! Subcommand handlers.
//!
//! Each handler drives the same components a page would: the session store,
//! the catalog browser, the stats aggregator and the detail/submission views.

use std::sync::Arc;

use modelatlas_core::catalog::{FetchOutcome, FilterState};
use modelatlas_core::charts::dashboard_series;
use modelatlas_core::config::AtlasConfig;
use modelatlas_core::context::AppContext;
use modelatlas_core::error::AppError;
use modelatlas_core::models::catalog::Severity;
use modelatlas_core::session::Handoff;
use modelatlas_core::submission::{SubmissionForm, SubmitOutcome};
use tracing::{info, warn};

use crate::cli::{BrowseArgs, Commands, ShowFormat};
use crate::{Error, Result};

pub async fn run(command: Commands, handoff: Option<String>) -> Result<()> {
    let config = AtlasConfig::from_env();

    // Preferences only; no session needed.
    if let Commands::Theme { toggle } = command {
        let ctx = AppContext::build(config, None)?;
        let theme = if toggle { ctx.toggle_theme()? } else { ctx.theme() };
        println!("{}", theme.as_str());
        return Ok(());
    }

    let handoff = match handoff {
        Some(raw) => Handoff::from_url(&raw)?,
        None => None,
    };
    let handoff_record = handoff.as_ref().and_then(|h| h.record_id.clone());
    let (ctx, outcome) = AppContext::start(config, handoff).await?;
    if let Some(url) = outcome.scrubbed_url {
        info!(%url, "handoff adopted");
    }

    match command {
        Commands::Version | Commands::Theme { .. } => {}
        Commands::Login { email, password } => {
            let user = ctx.session().login(&email, &password).await?;
            println!("Signed in as {}", user.email.as_deref().unwrap_or(&user.id));
        }
        Commands::Logout => {
            ctx.session().logout().await;
            println!("Signed out");
        }
        Commands::Whoami => {
            let snapshot = ctx.session().snapshot().await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Browse(args) => browse(&ctx, args).await?,
        Commands::Stats { charts } => {
            let stats = ctx.stats().fetch().await?;
            let out = if charts {
                serde_json::to_string_pretty(&dashboard_series(&stats))?
            } else {
                serde_json::to_string_pretty(&stats)?
            };
            println!("{out}");
        }
        Commands::Show { id, format } => {
            let id = id.or(handoff_record);
            let view = ctx.detail(id.as_deref()).await?;
            match format {
                ShowFormat::Card => println!("{}", view.export_json()?),
                ShowFormat::Summary => println!("{}", view.clean_summary()?),
                ShowFormat::Filename => println!("{}", view.download_filename()),
            }
        }
        Commands::Edit {
            id,
            assignments,
            major,
            verify,
        } => {
            let mut view = ctx.detail(Some(id.as_str())).await?;
            let mut draft = view.begin_edit().await?;
            for (path, value) in assignments {
                draft.set(&path, value).map_err(AppError::from)?;
            }
            for path in &major {
                draft.set_severity(path, Severity::Major);
            }
            let outcome = view.save(draft, verify).await?;
            if outcome.verification_downgraded {
                warn!(id = %id, "record is flagged; saved without verification");
            }
            println!(
                "Saved {} change(s){}",
                outcome.audit_entries.len(),
                if outcome.verified { ", verified" } else { "" }
            );
        }
        Commands::Flag {
            id,
            reason,
            comment,
        } => {
            let mut view = ctx.detail(Some(id.as_str())).await?;
            let flag_id = view.submit_flag(&reason, &comment).await?;
            println!("Flagged {id} (flag {flag_id})");
        }
        Commands::Unflag { id } => {
            let mut view = ctx.detail(Some(id.as_str())).await?;
            view.unflag().await?;
            println!("Unflagged {id}");
        }
        Commands::Like { id } => {
            let liked = ctx.session().toggle_like(&id).await?;
            println!("{} {id}", if liked { "Liked" } else { "Unliked" });
        }
        Commands::Submit { file, edit } => {
            let text = std::fs::read_to_string(&file)?;
            let form: SubmissionForm = serde_json::from_str(&text)?;
            let mut page = ctx.submission(edit.as_deref()).await?;
            *page.form_mut() = form;
            match page.submit().await? {
                SubmitOutcome::Created => println!("Submission created"),
                SubmitOutcome::Updated => println!("Submission updated"),
            }
        }
    }
    Ok(())
}

fn filters_from(args: &BrowseArgs) -> FilterState {
    FilterState {
        search_query: args.search.clone(),
        verified: args.verified,
        demo: args.demo,
        weights: args.weights,
        atlas: args.atlas,
        liked_only: args.liked,
        modalities: args.modalities.iter().cloned().collect(),
        specialties: args.specialties.iter().cloned().collect(),
        uses: args.uses.iter().cloned().collect(),
        sort: args.sort,
    }
}

async fn browse(ctx: &Arc<AppContext>, args: BrowseArgs) -> Result<()> {
    if args.pages == 0 {
        return Err(Error::Custom("--pages must be at least 1".into()));
    }
    if args.liked && ctx.session().user_id().await.is_none() {
        return Err(AppError::NotAuthenticated.into());
    }
    let catalog = ctx.catalog();
    let filters = filters_from(&args);
    let mut outcome = catalog.update_filters(|f| *f = filters).await?;
    if outcome == FetchOutcome::Skipped {
        outcome = catalog.fetch_models(true).await?;
    }
    for _ in 1..args.pages {
        if matches!(outcome, FetchOutcome::Loaded { exhausted: true, .. }) {
            break;
        }
        outcome = catalog.fetch_models(false).await?;
    }

    let models = catalog.models().await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }
    let session = ctx.session();
    for model in &models {
        let liked = if session.is_liked(&model.id).await { "*" } else { " " };
        let verified = if model.is_verified { "verified" } else { "" };
        println!(
            "{:>6} {liked} {:>4}  {:<40} {verified}",
            model.id,
            model.likes_count,
            model.card.name()
        );
    }
    println!("{} of {} models", models.len(), catalog.total().await);
    Ok(())
}
