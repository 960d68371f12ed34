//! Statement import command implementations
//!
//! Upload parses a statement into an import awaiting review; the review
//! commands adjust categories and then confirm or cancel it.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tally_core::models::{
    CategoryId, CategoryUpdate, ImportStatus, StatementUpload, TransactionId, UserId,
};
use tally_core::{cancel_pair, Error, ImportService};

use super::{parse_upload_id, truncate};

fn status_icon(status: ImportStatus) -> &'static str {
    match status {
        ImportStatus::Uploading | ImportStatus::Parsing => "⏳",
        ImportStatus::PendingReview => "📝",
        ImportStatus::Confirmed => "✅",
        ImportStatus::Cancelled => "🚫",
        ImportStatus::Failed => "❌",
    }
}

pub async fn cmd_upload(
    service: &ImportService,
    user: UserId,
    file: &Path,
    json: bool,
) -> Result<()> {
    let content =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("Statement path has no usable file name")?;

    if !json {
        println!("📄 Uploading {} ({} bytes)...", file_name, content.len());
    }

    // Ctrl-C stops extraction/parsing without marking the import failed
    let (handle, signal) = cancel_pair();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    let result = service.upload(&content, file_name, user, &signal).await;
    ctrl_c.abort();

    let upload = result.context("Upload failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&upload)?);
        return Ok(());
    }

    print_import(service, user, &upload)?;
    println!();
    println!("Next steps:");
    println!("  Change a category: tally categorize {} <LINE> <CATEGORY>", upload.id);
    println!("  Book it:           tally confirm {}", upload.id);
    Ok(())
}

pub fn cmd_show(service: &ImportService, user: UserId, id: &str, json: bool) -> Result<()> {
    let upload_id = parse_upload_id(id)?;
    let upload = service.get_by_id(upload_id, user)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&upload)?);
        return Ok(());
    }

    print_import(service, user, &upload)?;

    if upload.status == ImportStatus::Confirmed {
        let pending = service.db().pending_outbox(upload_id)?;
        if !pending.is_empty() {
            println!();
            println!(
                "⚠️  {} lines have not reached the ledger yet. Run 'tally resume {}'",
                pending.len(),
                upload_id
            );
        }
    }
    Ok(())
}

pub fn cmd_list(service: &ImportService, user: UserId, json: bool) -> Result<()> {
    let imports = service.list_for_user(user)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&imports)?);
        return Ok(());
    }

    if imports.is_empty() {
        println!("No imports yet. Run:");
        println!("  tally upload --file statement.pdf");
        return Ok(());
    }

    println!();
    println!("📥 Imports");
    println!("   ─────────────────────────────────────────────────────────────");

    for import in imports {
        println!(
            "   {} {} │ {:24} │ {:>3} lines │ {}",
            status_icon(import.status),
            import.id,
            truncate(&import.file_name, 24),
            import.transaction_count,
            import.uploaded_at.format("%Y-%m-%d %H:%M")
        );
        if let Some(reason) = import.error_message {
            println!("      {}", truncate(&reason, 70));
        }
    }

    Ok(())
}

/// Find a line by 1-based number or by id
pub fn find_line(upload: &StatementUpload, line: &str) -> Result<TransactionId> {
    if let Ok(number) = line.parse::<usize>() {
        return number
            .checked_sub(1)
            .and_then(|index| upload.transactions.get(index))
            .map(|t| t.id)
            .with_context(|| {
                format!(
                    "Line {} does not exist (import has {} lines)",
                    number,
                    upload.transactions.len()
                )
            });
    }

    let id = line
        .parse::<TransactionId>()
        .with_context(|| format!("Invalid line: {}", line))?;
    Ok(id)
}

pub fn cmd_categorize(
    service: &ImportService,
    user: UserId,
    id: &str,
    line: &str,
    category: &str,
) -> Result<()> {
    let upload_id = parse_upload_id(id)?;
    let upload = service.get_by_id(upload_id, user)?;
    let transaction_id = find_line(&upload, line)?;

    let (category_id, category_name) = match category.parse::<CategoryId>() {
        Ok(id) => (id, category.to_string()),
        Err(_) => {
            let found = service
                .resolve_category(user, category)?
                .with_context(|| format!("No category matches '{}'", category))?;
            (found.id, found.name)
        }
    };

    let updated = service.update_categories(
        upload_id,
        user,
        &[CategoryUpdate {
            transaction_id,
            category_id,
        }],
    )?;

    let description = updated
        .transaction(transaction_id)
        .map(|t| t.description.as_str())
        .unwrap_or("");
    println!("✅ {} → {}", description, category_name);
    Ok(())
}

pub async fn cmd_confirm(service: &ImportService, user: UserId, id: &str) -> Result<()> {
    let upload_id = parse_upload_id(id)?;

    match service.confirm(upload_id, user).await {
        Ok(upload) => {
            println!(
                "✅ Confirmed {}: {} transactions booked",
                upload.file_name,
                upload.transactions.len()
            );
            Ok(())
        }
        Err(e @ Error::TransactionCreation(_)) => {
            eprintln!("⚠️  The import is confirmed but not every line reached the ledger.");
            eprintln!("   Run 'tally resume {}' to deliver the rest.", upload_id);
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn cmd_cancel(service: &ImportService, user: UserId, id: &str) -> Result<()> {
    let upload_id = parse_upload_id(id)?;
    let upload = service.cancel(upload_id, user)?;
    println!("🚫 Cancelled {}", upload.file_name);
    Ok(())
}

pub async fn cmd_resume(service: &ImportService, user: UserId, id: &str) -> Result<()> {
    let upload_id = parse_upload_id(id)?;
    let delivered = service.resume_confirmation(upload_id, user).await?;

    if delivered == 0 {
        println!("Nothing pending, every line is already in the ledger.");
    } else {
        println!("✅ Delivered {} pending transactions", delivered);
    }
    Ok(())
}

fn print_import(service: &ImportService, user: UserId, upload: &StatementUpload) -> Result<()> {
    let names: HashMap<CategoryId, String> = service
        .categories(user)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    println!();
    println!(
        "{} {} ({})",
        status_icon(upload.status),
        upload.file_name,
        upload.status
    );
    println!("   Import: {}", upload.id);
    if let Some(period) = upload.period {
        println!("   Period: {}", period);
    }
    if let Some(reason) = &upload.error_message {
        println!("   Error:  {}", reason);
    }

    if upload.transactions.is_empty() {
        return Ok(());
    }

    println!("   ─────────────────────────────────────────────────────────────");
    for (index, line) in upload.transactions.iter().enumerate() {
        let category_id = line.effective_category_id();
        let category = names
            .get(&category_id)
            .map(String::as_str)
            .unwrap_or("?");
        let edited = if line.confirmed_category_id.is_some() {
            "*"
        } else {
            ""
        };
        println!(
            "   {:>3}. {} │ {:28} │ {:>10} {} │ {}{}",
            index + 1,
            line.date,
            truncate(&line.description, 28),
            line.amount,
            line.currency,
            category,
            edited
        );
    }

    Ok(())
}
