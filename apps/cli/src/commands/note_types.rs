//! Note type edits and batch regeneration.
//!
//! Both run on the blocking pool while a Ctrl-C watcher flips the cancel flag;
//! the batch stops cleanly after the note in progress.

use anyhow::{Context, Result};
use chrono::Utc;
use notecard_core::service::apply_note_type_edit;
use notecard_core::{regenerate_note_type, CancelFlag, NoteTypeEdit, RegenerationOptions, RegenerationReport, Store};

use super::App;

/// Run `job` off the async runtime, cancelling `cancel` on Ctrl-C.
pub async fn with_cancellation<F, T>(cancel: CancelFlag, job: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current note");
                cancel.cancel();
            }
        }
    });

    let result = tokio::task::spawn_blocking(job)
        .await
        .context("regeneration task failed");
    watcher.abort();
    result
}

fn options_for(app: &mut App) -> Result<RegenerationOptions> {
    let default_deck = app.repo.ensure_deck(&app.config.default_deck)?;
    Ok(RegenerationOptions::new(default_deck, Utc::now()))
}

/// Apply `edit` to the note type `name`, regenerating its cards when needed.
///
/// Hands the app back so callers can keep using the collection.
pub async fn edit(mut app: App, name: String, edit: NoteTypeEdit) -> Result<(App, RegenerationReport)> {
    let options = options_for(&mut app)?;
    edit_with_options(app, name, edit, options).await
}

pub async fn edit_with_options(
    mut app: App,
    name: String,
    edit: NoteTypeEdit,
    options: RegenerationOptions,
) -> Result<(App, RegenerationReport)> {
    let (app, report) = with_cancellation(options.cancel.clone(), move || {
        let report = apply_note_type_edit(&mut app.repo, app.scheduler.as_ref(), &name, &edit, &options);
        (app, report)
    })
    .await?;
    Ok((app, report?))
}

pub async fn regenerate(mut app: App, name: String) -> Result<(App, RegenerationReport)> {
    let options = options_for(&mut app)?;
    regenerate_with_options(app, name, options).await
}

pub async fn regenerate_with_options(
    mut app: App,
    name: String,
    options: RegenerationOptions,
) -> Result<(App, RegenerationReport)> {
    let (app, report) = with_cancellation(options.cancel.clone(), move || {
        let report = regenerate_note_type(&mut app.repo, app.scheduler.as_ref(), &name, &options);
        (app, report)
    })
    .await?;
    Ok((app, report?))
}
