mod common;

use common::{settle, start_host, RawView, ServiceCall, Stores, DOC};
use md_web_host::ExternalOrigin;
use md_web_protocol::{
    CommandName, EditPayload, ExportFormat, ExportRequest, FormatKind, FormatRequest, OpenPayload, ScrollPayload,
    UpdatePayload, UploadFailure, UploadRequest, UploadResolved,
};

async fn connect(stores: &Stores) -> (md_web_host::HostHandle, tokio::task::JoinHandle<()>, RawView) {
    let (handle, task, link) = start_host(stores).await;
    (handle, task, RawView { link })
}

#[tokio::test(start_paused = true)]
async fn init_is_answered_with_open() {
    let stores = Stores::new("# Notes");
    let (handle, _task, mut view) = connect(&stores).await;

    let open: OpenPayload = view.init().await.payload().unwrap();
    assert_eq!(open.content, "# Notes");
    assert_eq!(open.root_path, "/notes");
    assert_eq!(open.revision, 1);
    assert_eq!(open.config.platform, "linux");
    settle().await;
    assert!(handle.status().view_ready);
}

#[tokio::test(start_paused = true)]
async fn saves_are_not_echoed() {
    let stores = Stores::new("a");
    let (handle, _task, mut view) = connect(&stores).await;
    view.init().await;

    view.send(CommandName::Save, &EditPayload::tagged("ab", 1));
    assert!(view.drain().await.is_empty());
    assert_eq!(handle.status().revision, 2);
    assert_eq!(stores.documents.writes(), vec!["ab".to_string()]);
    assert!(!handle.status().dirty);
}

#[tokio::test(start_paused = true)]
async fn edit_based_on_replaced_content_is_dropped() {
    let stores = Stores::new("draft");
    let (handle, _task, mut view) = connect(&stores).await;
    view.init().await;

    handle.external("reloaded", ExternalOrigin::Reload);
    let update: UpdatePayload = view.recv().await.unwrap().payload().unwrap();
    assert_eq!(update.revision, 2);

    // Typed before the view saw the reload
    view.send(CommandName::Save, &EditPayload::tagged("draft + typing", 1));
    settle().await;
    assert_eq!(stores.documents.current(DOC).as_deref(), Some("reloaded"));

    view.send(CommandName::Save, &EditPayload::tagged("reloaded + typing", 2));
    settle().await;
    assert_eq!(stores.documents.current(DOC).as_deref(), Some("reloaded + typing"));
    assert_eq!(handle.status().revision, 3);
}

#[tokio::test(start_paused = true)]
async fn host_messages_wait_for_init() {
    let stores = Stores::new("v1");
    let (handle, _task, mut view) = connect(&stores).await;

    handle.external("v2", ExternalOrigin::Undo);
    handle.format(FormatKind::Bold);
    assert!(view.drain().await.is_empty());

    let open: OpenPayload = view.init().await.payload().unwrap();
    assert_eq!(open.content, "v2");
    let queued = view.drain().await;
    let names: Vec<_> = queued.iter().map(|e| e.name.clone()).collect();
    assert_eq!(names, vec![CommandName::Update, CommandName::Format]);
    let format: FormatRequest = queued[1].payload().unwrap();
    assert_eq!(format.kind(), Some(FormatKind::Bold));
}

#[tokio::test(start_paused = true)]
async fn reveal_restores_last_reported_scroll() {
    let stores = Stores::new("text");
    let (handle, _task, mut view) = connect(&stores).await;
    view.init().await;

    view.send(CommandName::Scroll, &ScrollPayload { scroll_top: 230.0 });
    settle().await;
    handle.reveal();
    let restore = view.recv().await.unwrap();
    assert_eq!(restore.name, CommandName::RestoreScrollPosition);
    let top: f64 = restore.payload().unwrap();
    assert!((top - 230.0).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn uploads_are_answered_by_token() {
    let stores = Stores::new("");
    let (_handle, _task, mut view) = connect(&stores).await;
    view.init().await;

    let request = UploadRequest {
        token: 41,
        mime: "image/png".into(),
        data: vec![1, 2, 3],
    };
    let frame = md_web_protocol::Envelope::from_value(CommandName::Img, request.into_value())
        .encode()
        .unwrap();
    view.send_frame(frame);
    let resolved: UploadResolved = view.recv().await.unwrap().payload().unwrap();
    assert_eq!(resolved.token, 41);
    assert_eq!(resolved.uri, "assets/img-1.png");

    stores
        .attachments
        .refuse
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let frame = md_web_protocol::Envelope::from_value(
        CommandName::Img,
        UploadRequest {
            token: 42,
            mime: "image/png".into(),
            data: vec![9],
        }
        .into_value(),
    )
    .encode()
    .unwrap();
    view.send_frame(frame);
    let failed = view.recv().await.unwrap();
    assert_eq!(failed.name, CommandName::UploadFailed);
    let failed: UploadFailure = failed.payload().unwrap();
    assert_eq!(failed.token, 42);
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_do_not_end_the_session() {
    let stores = Stores::new("a");
    let (handle, task, mut view) = connect(&stores).await;
    view.init().await;

    view.send_frame(vec![0xc1]);
    view.send(CommandName::Scroll, "not a map");
    view.send(CommandName::Export, &ExportRequest {
        kind: "odt".into(),
        without_outline: None,
    });
    view.send(CommandName::Update, &UpdatePayload {
        content: "from the wrong side".into(),
        revision: 9,
    });
    view.send(CommandName::Save, &EditPayload::Bare("still alive".into()));
    settle().await;

    assert!(!task.is_finished());
    assert_eq!(handle.status().revision, 2);
    assert!(stores.services.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn service_requests_reach_host_services() {
    let stores = Stores::new("a");
    let (_handle, _task, mut view) = connect(&stores).await;
    view.init().await;

    view.send(CommandName::OpenLink, "https://example.com");
    view.send(CommandName::OpenLink, "other.md");
    view.send(CommandName::Command, "vsc-markdown.paste");
    view.send(CommandName::Export, &ExportRequest::new(ExportFormat::Pdf).without_outline());
    view.send(CommandName::EditInVSCode, &true);
    view.send_frame(
        md_web_protocol::Envelope::bare(CommandName::DeveloperTool)
            .encode()
            .unwrap(),
    );
    settle().await;

    let calls = stores.services.calls();
    assert_eq!(calls.len(), 6);
    for expected in [
        ServiceCall::OpenLink("https://example.com/".into()),
        ServiceCall::OpenLink("file:///notes/other.md".into()),
        ServiceCall::Command("vsc-markdown.paste".into()),
        ServiceCall::Export {
            format: ExportFormat::Pdf,
            without_outline: true,
        },
        ServiceCall::EditAsText(DOC.into()),
        ServiceCall::DeveloperTools,
    ] {
        assert!(calls.contains(&expected), "missing {expected:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn outline_toggle_is_saved_and_reopened() {
    let stores = Stores::new("a");
    let (_handle, _task, mut view) = connect(&stores).await;
    let open: OpenPayload = view.init().await.payload().unwrap();
    assert!(!open.config.outline);

    view.send(CommandName::SaveOutline, &true);
    settle().await;
    assert_eq!(stores.services.calls(), vec![ServiceCall::SaveOutline(true)]);

    let reopened: OpenPayload = view.init().await.payload().unwrap();
    assert!(reopened.config.outline);
}

#[tokio::test(start_paused = true)]
async fn do_save_skips_the_debounce() {
    let stores = Stores::new("a");
    let (_handle, _task, mut view) = connect(&stores).await;
    view.init().await;

    view.send(CommandName::DoSave, &EditPayload::tagged("saved now", 1));
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(stores.documents.writes(), vec!["saved now".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn closing_flushes_unsaved_edit() {
    let stores = Stores::new("a");
    let (handle, task, mut view) = connect(&stores).await;
    view.init().await;

    view.send(CommandName::Save, &EditPayload::tagged("unsaved", 1));
    tokio::task::yield_now().await;
    drop(view);
    task.await.unwrap();

    assert_eq!(stores.documents.writes(), vec!["unsaved".to_string()]);
    let status = handle.status();
    assert!(status.closed);
    assert!(!status.dirty);
    assert!(handle.is_closed());
}

#[tokio::test(start_paused = true)]
async fn close_request_ends_session_while_view_stays() {
    let stores = Stores::new("a");
    let (handle, task, mut view) = connect(&stores).await;
    view.init().await;

    view.send(CommandName::Save, &EditPayload::tagged("closing", 1));
    tokio::task::yield_now().await;
    assert!(handle.close());
    task.await.unwrap();

    assert_eq!(stores.documents.writes(), vec!["closing".to_string()]);
    assert!(handle.status().closed);
    // The view link is still open; nothing more is sent to it
    assert!(view.drain().await.is_empty());
}
