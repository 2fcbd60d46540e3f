//! Commands the view accepts from the host

use anyhow::{anyhow, bail};
use rmpv::Value;
use tracing::{debug, info};

use md_web_protocol::{
    CommandName, DispatchError, Dispatcher, FormatRequest, OpenPayload, Side, UpdatePayload, UploadFailure,
    UploadResolved,
};

use crate::runtime::ViewContext;
use crate::surface::{WidgetCallbacks, WidgetConfig};
use crate::toolbar::ToolbarSpec;

pub fn view_table() -> Dispatcher<ViewContext> {
    Dispatcher::new(Side::View)
        .on(CommandName::Open, open)
        .on(CommandName::Update, update)
        .on_value(CommandName::RestoreScrollPosition, |ctx: &mut ViewContext, value| {
            let top = scroll_top_of(&value)
                .ok_or_else(|| DispatchError::Payload("expected a number or {scrollTop}".to_string()))?;
            ctx.restore_scroll(top);
            Ok(())
        })
        .on(CommandName::Uploaded, |ctx: &mut ViewContext, done: UploadResolved| {
            ctx.settle_upload(done.token, Some(&done.uri));
            Ok(())
        })
        .on(CommandName::UploadFailed, |ctx: &mut ViewContext, failed: UploadFailure| {
            debug!(token = failed.token, reason = %failed.reason, "upload failed on host");
            ctx.settle_upload(failed.token, None);
            Ok(())
        })
        .on(CommandName::Format, |ctx: &mut ViewContext, request: FormatRequest| {
            let kind = request
                .kind()
                .ok_or_else(|| anyhow!("unknown format kind {:?}", request.kind))?;
            ctx.format(kind);
            Ok(())
        })
}

#[allow(clippy::cast_precision_loss)]
fn scroll_top_of(value: &Value) -> Option<f64> {
    match value {
        Value::F32(_) | Value::F64(_) => value.as_f64(),
        Value::Integer(n) => n.as_i64().map(|n| n as f64),
        Value::Map(entries) => entries
            .iter()
            .find(|(k, _)| k.as_str() == Some("scrollTop"))
            .and_then(|(_, v)| scroll_top_of(v)),
        _ => None,
    }
}

fn open(ctx: &mut ViewContext, open: OpenPayload) -> anyhow::Result<()> {
    if ctx.editor.is_some() {
        info!("editor re-opened");
    }

    let language = if open.config.editor_language.is_empty() {
        "en_US".to_string()
    } else {
        open.config.editor_language.clone()
    };
    let widget = WidgetConfig {
        mode: ctx.config.mode,
        language,
        toolbar: (!open.config.hide_toolbar).then(ToolbarSpec::markdown_default),
        tab: "\t".to_string(),
        math_engine: "KaTeX".to_string(),
        code_line_numbers: open.config.preview_code_highlight.show_line_number,
        outline: open.config.outline,
        resource_path: open.root_path,
        value: open.content,
    };

    ctx.revision = open.revision;
    ctx.editor_config = open.config;
    ctx.container = None;
    ctx.pending_scroll = None;
    let callbacks = WidgetCallbacks::new(ctx.events.clone());
    ctx.editor = Some(ctx.factory.create(widget, callbacks));
    ctx.rewrite_images();

    let flushed = ctx.channel.mark_peer_ready()?;
    ctx.editor_ready.mark();
    info!(revision = ctx.revision, flushed, "editor opened");

    ctx.discover(0);
    ctx.restore_scroll(open.scroll_top);
    for kind in std::mem::take(&mut ctx.queued_formats) {
        ctx.format(kind);
    }
    Ok(())
}

fn update(ctx: &mut ViewContext, update: UpdatePayload) -> anyhow::Result<()> {
    if update.revision <= ctx.revision {
        debug!(revision = update.revision, current = ctx.revision, "ignoring stale update");
        return Ok(());
    }
    let Some(editor) = ctx.editor.as_ref() else {
        bail!("update before open");
    };

    if editor.value() != update.content {
        ctx.replace_content(&update.content);
    }
    ctx.revision = update.revision;
    debug!(revision = ctx.revision, "content replaced by host");
    Ok(())
}
