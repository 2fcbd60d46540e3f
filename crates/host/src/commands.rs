//! Commands the host accepts from the view

use anyhow::anyhow;
use rmpv::Value;
use tracing::{debug, warn};

use md_web_protocol::{
    CommandName, DispatchError, Dispatcher, EditPayload, ExportRequest, ScrollPayload, Side, UploadRequest,
};

use crate::runtime::HostContext;
use crate::services::resolve_link;

pub fn host_table() -> Dispatcher<HostContext> {
    Dispatcher::new(Side::Host)
        .on_value(CommandName::Init, |ctx: &mut HostContext, _| {
            ctx.greet();
            Ok(())
        })
        .on(CommandName::Save, |ctx: &mut HostContext, edit: EditPayload| {
            ctx.accept_edit(edit, false);
            Ok(())
        })
        .on(CommandName::DoSave, |ctx: &mut HostContext, edit: EditPayload| {
            ctx.accept_edit(edit, true);
            Ok(())
        })
        .on(CommandName::Scroll, |ctx: &mut HostContext, scroll: ScrollPayload| {
            ctx.bridge.record_scroll(scroll.scroll_top);
            Ok(())
        })
        .on_value(CommandName::Img, |ctx: &mut HostContext, value| {
            let request = UploadRequest::try_from(value).map_err(|e| DispatchError::Payload(e.to_string()))?;
            ctx.store_upload(request);
            Ok(())
        })
        .on(CommandName::OpenLink, open_link)
        .on(CommandName::Command, |ctx: &mut HostContext, id: String| {
            let services = ctx.deps.services.clone();
            ctx.spawn_service("command", async move { services.run_command(&id).await });
            Ok(())
        })
        .on(CommandName::Export, export)
        .on_value(CommandName::EditInVSCode, |ctx: &mut HostContext, value| {
            if value.as_bool() == Some(false) {
                debug!(session_id = %ctx.id(), "staying in the rich editor");
                return Ok(());
            }
            let services = ctx.deps.services.clone();
            let document = ctx.document();
            ctx.spawn_service("editInVSCode", async move { services.edit_in_text_editor(&document).await });
            Ok(())
        })
        .on_value(CommandName::DeveloperTool, |ctx: &mut HostContext, _: Value| {
            let services = ctx.deps.services.clone();
            ctx.spawn_service("developerTool", async move { services.open_developer_tools().await });
            Ok(())
        })
        .on(CommandName::SaveOutline, |ctx: &mut HostContext, enabled: bool| {
            // Later opens in this session keep the panel state
            ctx.editor.outline = enabled;
            let services = ctx.deps.services.clone();
            ctx.spawn_service("saveOutline", async move { services.save_outline(enabled).await });
            Ok(())
        })
}

fn open_link(ctx: &mut HostContext, href: String) -> anyhow::Result<()> {
    let document = ctx.document();
    let Some(url) = resolve_link(&document, &href) else {
        warn!(session_id = %ctx.id(), href = %href, "ignoring unresolvable link");
        return Ok(());
    };
    let services = ctx.deps.services.clone();
    ctx.spawn_service("openLink", async move { services.open_link(&url).await });
    Ok(())
}

fn export(ctx: &mut HostContext, request: ExportRequest) -> anyhow::Result<()> {
    let format = request
        .format()
        .ok_or_else(|| anyhow!("unknown export type {:?}", request.kind))?;
    let without_outline = request.without_outline.unwrap_or(false);
    let services = ctx.deps.services.clone();
    let document = ctx.document();
    ctx.spawn_service("export", async move {
        services.export(&document, format, without_outline).await
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_accepts_only_view_commands() {
        let table = host_table();
        for name in [
            CommandName::Init,
            CommandName::Save,
            CommandName::DoSave,
            CommandName::Scroll,
            CommandName::Img,
            CommandName::OpenLink,
            CommandName::Command,
            CommandName::Export,
            CommandName::EditInVSCode,
            CommandName::DeveloperTool,
            CommandName::SaveOutline,
        ] {
            assert!(table.handles(&name), "{name} should be handled");
        }
        assert!(!table.handles(&CommandName::Update));
        assert!(!table.handles(&CommandName::Open));
    }
}
