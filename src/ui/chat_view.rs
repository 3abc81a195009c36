use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use gtk4 as gtk;
use gtk4::prelude::*;

use crate::api::client::{ApiClient, Attachment};
use crate::api::events::SyncEvent;
use crate::api::models::{AgentSummary, Conversation};
use crate::sync::{Message, MessageId, MessageSync, PollHandle};

struct ActiveChat {
    conversation: Conversation,
    client: ApiClient,
    sync: Arc<MessageSync<ApiClient>>,
    poll: Option<PollHandle>,
}

impl Drop for ActiveChat {
    fn drop(&mut self) {
        self.sync.close();
        if let Some(poll) = self.poll.take() {
            poll.cancel();
        }
    }
}

pub struct ChatView {
    root: gtk::Box,
    title: gtk::Label,
    presence: gtk::Label,
    scroller: gtk::ScrolledWindow,
    messages_box: gtk::Box,
    entry: gtk::Entry,
    actions: gtk::Box,
    overlay: adw::ToastOverlay,
    poll_period: Duration,
    rows: RefCell<HashMap<MessageId, gtk::Widget>>,
    active: RefCell<Option<ActiveChat>>,
    /// Bumped on every conversation switch so stale replies can be dropped.
    generation: Cell<u64>,
}

impl ChatView {
    pub fn new(overlay: adw::ToastOverlay, poll_period: Duration) -> Rc<Self> {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 6);
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);

        let header = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        let title = gtk::Label::new(Some("Select a conversation"));
        title.add_css_class("title-4");
        title.set_halign(gtk::Align::Start);
        title.set_hexpand(true);
        let presence = gtk::Label::new(None);
        presence.add_css_class("dim-label");
        header.append(&title);
        header.append(&presence);

        let actions = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        let attach_btn = gtk::Button::with_label("Image");
        let transfer_btn = gtk::Button::with_label("Transfer");
        let history_btn = gtk::Button::with_label("History");
        actions.append(&attach_btn);
        actions.append(&transfer_btn);
        actions.append(&history_btn);
        actions.set_sensitive(false);
        header.append(&actions);
        root.append(&header);

        let scroller = gtk::ScrolledWindow::builder()
            .vexpand(true)
            .hexpand(true)
            .build();
        let messages_box = gtk::Box::new(gtk::Orientation::Vertical, 6);
        scroller.set_child(Some(&messages_box));
        root.append(&scroller);

        let input_row = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        let entry = gtk::Entry::new();
        entry.set_hexpand(true);
        entry.set_placeholder_text(Some("Type a message…"));
        let send_btn = gtk::Button::with_label("Send");
        send_btn.add_css_class("suggested-action");
        input_row.append(&entry);
        input_row.append(&send_btn);
        root.append(&input_row);

        let view = Rc::new(Self {
            root,
            title,
            presence,
            scroller,
            messages_box,
            entry,
            actions,
            overlay,
            poll_period,
            rows: RefCell::new(HashMap::new()),
            active: RefCell::new(None),
            generation: Cell::new(0),
        });

        {
            let weak = Rc::downgrade(&view);
            send_btn.connect_clicked(move |_| {
                if let Some(view) = weak.upgrade() {
                    view.send_current();
                }
            });
        }
        {
            let weak = Rc::downgrade(&view);
            view.entry.connect_activate(move |_| {
                if let Some(view) = weak.upgrade() {
                    view.send_current();
                }
            });
        }
        {
            let weak = Rc::downgrade(&view);
            attach_btn.connect_clicked(move |_| {
                if let Some(view) = weak.upgrade() {
                    view.pick_image();
                }
            });
        }
        {
            let weak = Rc::downgrade(&view);
            transfer_btn.connect_clicked(move |_| {
                if let Some(view) = weak.upgrade() {
                    view.show_transfer_dialog();
                }
            });
        }
        {
            let weak = Rc::downgrade(&view);
            history_btn.connect_clicked(move |_| {
                if let Some(view) = weak.upgrade() {
                    view.show_history_dialog();
                }
            });
        }

        view
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    fn toast(&self, text: &str) {
        self.overlay.add_toast(adw::Toast::new(text));
    }

    fn parent_window(&self) -> Option<gtk::Window> {
        self.root.root().and_then(|r| r.downcast::<gtk::Window>().ok())
    }

    fn current(&self) -> Option<(Conversation, ApiClient, Arc<MessageSync<ApiClient>>)> {
        self.active
            .borrow()
            .as_ref()
            .map(|a| (a.conversation.clone(), a.client.clone(), Arc::clone(&a.sync)))
    }

    /// Switch to `conversation`: unmount the previous chat, load history and
    /// start polling.
    pub fn open(self: &Rc<Self>, conversation: Conversation, client: ApiClient) {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        self.active.borrow_mut().take();
        self.clear_rows();

        self.title.set_label(conversation.title());
        self.presence.set_label("");
        self.actions.set_sensitive(true);

        let (sync, mut events) = MessageSync::new(Arc::new(client.clone()), conversation.id.clone());
        let (tx, rx) = crate::utils::glib_channel::<SyncEvent>();
        crate::utils::spawn_async(async move {
            while let Some(event) = events.recv().await {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
        {
            let weak = Rc::downgrade(self);
            rx.attach(None, move |event| {
                let Some(view) = weak.upgrade() else { return glib::ControlFlow::Break };
                if view.generation.get() != generation {
                    return glib::ControlFlow::Break;
                }
                view.apply(event);
                glib::ControlFlow::Continue
            });
        }

        *self.active.borrow_mut() = Some(ActiveChat {
            conversation: conversation.clone(),
            client: client.clone(),
            sync: Arc::clone(&sync),
            poll: None,
        });

        let period = self.poll_period;
        let mounted = crate::utils::run_async_to_main(async move {
            Ok::<PollHandle, ()>(sync.mount(period).await)
        });
        {
            let weak = Rc::downgrade(self);
            mounted.attach(None, move |res| {
                if let (Some(view), Ok(handle)) = (weak.upgrade(), res) {
                    if view.generation.get() == generation {
                        if let Some(active) = view.active.borrow_mut().as_mut() {
                            active.poll = Some(handle);
                        }
                    }
                }
                glib::ControlFlow::Break
            });
        }

        let chat_id = conversation.id.clone();
        let presence = crate::utils::run_async_to_main(async move {
            Ok::<_, ()>(client.chat_presence(&chat_id).await)
        });
        {
            let weak = Rc::downgrade(self);
            presence.attach(None, move |res| {
                if let (Some(view), Ok(Some(p))) = (weak.upgrade(), res) {
                    if view.generation.get() == generation {
                        view.presence.set_label(if p.online { "Online" } else { "Offline" });
                    }
                }
                glib::ControlFlow::Break
            });
        }
    }

    fn apply(&self, event: SyncEvent) {
        match event {
            SyncEvent::Replaced(messages) => {
                self.clear_rows();
                for msg in &messages {
                    self.append_row(msg);
                }
                self.scroll_to_end();
            }
            SyncEvent::Appended(messages) => {
                for msg in &messages {
                    self.append_row(msg);
                }
                self.scroll_to_end();
            }
            SyncEvent::Updated { previous, message } => {
                let old = self.rows.borrow_mut().remove(&previous);
                if let Some(old) = old {
                    let bubble = Self::bubble(&message);
                    self.messages_box.insert_child_after(&bubble, Some(&old));
                    self.messages_box.remove(&old);
                    self.rows.borrow_mut().insert(message.id, bubble);
                }
            }
            SyncEvent::Removed(id) => {
                if let Some(old) = self.rows.borrow_mut().remove(&id) {
                    self.messages_box.remove(&old);
                }
            }
            SyncEvent::Alert { title, body } => self.toast(&format!("{title}: {body}")),
        }
    }

    fn clear_rows(&self) {
        while let Some(child) = self.messages_box.first_child() {
            self.messages_box.remove(&child);
        }
        self.rows.borrow_mut().clear();
    }

    fn append_row(&self, msg: &Message) {
        let bubble = Self::bubble(msg);
        self.messages_box.append(&bubble);
        self.rows.borrow_mut().insert(msg.id, bubble);
    }

    fn bubble(msg: &Message) -> gtk::Widget {
        let bubble = gtk::Box::new(gtk::Orientation::Vertical, 2);
        bubble.add_css_class("card");
        bubble.set_halign(if msg.mine { gtk::Align::End } else { gtk::Align::Start });
        let text = gtk::Label::new(Some(&msg.text));
        text.set_wrap(true);
        text.set_selectable(true);
        text.set_xalign(0.0);
        text.set_margin_top(6);
        text.set_margin_start(10);
        text.set_margin_end(10);
        let time = gtk::Label::new(Some(if msg.is_pending() { "sending…" } else { msg.time.as_str() }));
        time.add_css_class("dim-label");
        time.add_css_class("caption");
        time.set_halign(gtk::Align::End);
        time.set_margin_bottom(4);
        time.set_margin_end(10);
        bubble.append(&text);
        bubble.append(&time);
        if msg.is_pending() {
            bubble.set_opacity(0.6);
        }
        bubble.upcast()
    }

    fn scroll_to_end(&self) {
        let adj = self.scroller.vadjustment();
        adj.set_value(adj.upper());
    }

    fn send_current(&self) {
        let Some((_, _, sync)) = self.current() else { return };
        let text = self.entry.text().to_string();
        if text.trim().is_empty() || sync.is_sending() {
            return;
        }
        self.entry.set_text("");
        crate::utils::spawn_async(async move {
            let _ = sync.send(&text).await;
        });
    }

    fn pick_image(self: &Rc<Self>) {
        let Some((_, _, sync)) = self.current() else { return };
        let parent = self.parent_window();
        let chooser = gtk::FileChooserNative::new(
            Some("Send image"),
            parent.as_ref(),
            gtk::FileChooserAction::Open,
            Some("Send"),
            Some("Cancel"),
        );
        let filter = gtk::FileFilter::new();
        filter.add_mime_type("image/*");
        filter.set_name(Some("Images"));
        chooser.add_filter(&filter);

        let weak = Rc::downgrade(self);
        // The native dialog is only kept alive by this handler until it answers.
        let keep = RefCell::new(Some(chooser.clone()));
        chooser.connect_response(move |dialog, resp| {
            keep.borrow_mut().take();
            let path = (resp == gtk::ResponseType::Accept)
                .then(|| dialog.file())
                .flatten()
                .and_then(|f| f.path());
            dialog.destroy();
            let Some(path) = path else { return };
            if let Some(view) = weak.upgrade() {
                view.toast("Uploading image…");
            }
            let sync = Arc::clone(&sync);
            crate::utils::spawn_async(async move {
                match Attachment::from_path(&path).await {
                    Ok(attachment) => {
                        let _ = sync.send_image(attachment).await;
                    }
                    Err(e) => log::error!("Cannot read {}: {e}", path.display()),
                }
            });
        });
        chooser.show();
    }

    fn show_transfer_dialog(self: &Rc<Self>) {
        let Some((conversation, client, sync)) = self.current() else { return };
        let dialog = gtk::Dialog::builder().title("Transfer conversation").modal(true).build();
        if let Some(parent) = self.parent_window() {
            dialog.set_transient_for(Some(&parent));
        }
        let content = gtk::Box::new(gtk::Orientation::Vertical, 12);
        content.set_margin_top(12);
        content.set_margin_bottom(12);
        content.set_margin_start(12);
        content.set_margin_end(12);

        let info = gtk::Label::new(Some(&format!("Hand \"{}\" to another agent:", conversation.title())));
        info.set_halign(gtk::Align::Start);
        content.append(&info);

        let dropdown = gtk::DropDown::from_strings(&[]);
        dropdown.set_hexpand(true);
        content.append(&dropdown);

        let note = gtk::Entry::new();
        note.set_placeholder_text(Some("Note (optional), e.g. customer needs technical support"));
        content.append(&note);

        dialog.set_child(Some(&content));
        let _ = dialog.add_button("Cancel", gtk::ResponseType::Cancel);
        let ok_btn = dialog.add_button("Transfer", gtk::ResponseType::Ok);
        ok_btn.add_css_class("suggested-action");
        dialog.set_default_response(gtk::ResponseType::Ok);

        let agents: Rc<RefCell<Vec<AgentSummary>>> = Rc::new(RefCell::new(Vec::new()));
        let rx = crate::utils::run_async_to_main(async move { client.transfer_candidates().await });
        {
            let agents = agents.clone();
            let dropdown = dropdown.clone();
            let weak = Rc::downgrade(self);
            rx.attach(None, move |res| {
                match res {
                    Ok(list) => {
                        let labels: Vec<String> = list
                            .iter()
                            .map(|a| match a.status {
                                Some(status) => format!("{} ({})", a.name, status.label()),
                                None => a.name.clone(),
                            })
                            .collect();
                        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
                        dropdown.set_model(Some(&gtk::StringList::new(&refs)));
                        *agents.borrow_mut() = list;
                    }
                    Err(e) => {
                        log::error!("Failed to load agents: {e}");
                        if let Some(view) = weak.upgrade() {
                            view.toast("Could not load the agent list");
                        }
                    }
                }
                glib::ControlFlow::Break
            });
        }

        let weak = Rc::downgrade(self);
        dialog.connect_response(move |dlg, resp| {
            if resp == gtk::ResponseType::Ok {
                let picked = agents.borrow().get(dropdown.selected() as usize).cloned();
                let Some(target) = picked else {
                    if let Some(view) = weak.upgrade() {
                        view.toast("Please choose an agent to transfer to");
                    }
                    return;
                };
                let note = note.text().to_string();
                let sync = Arc::clone(&sync);
                let key = target.key().to_string();
                let rx = crate::utils::run_async_to_main(async move { sync.transfer(&key, &note).await });
                let weak = weak.clone();
                rx.attach(None, move |res| {
                    if let (Some(view), Ok(receipt)) = (weak.upgrade(), res) {
                        let to = if receipt.to_agent.is_empty() { target.name.clone() } else { receipt.to_agent };
                        view.toast(&format!("Conversation transferred to {to}"));
                    }
                    glib::ControlFlow::Break
                });
            }
            dlg.close();
        });

        dialog.present();
    }

    fn show_history_dialog(self: &Rc<Self>) {
        let Some((conversation, client, _)) = self.current() else { return };
        let dialog = gtk::Dialog::builder().title("Transfer history").modal(true).build();
        if let Some(parent) = self.parent_window() {
            dialog.set_transient_for(Some(&parent));
        }
        let content = gtk::Box::new(gtk::Orientation::Vertical, 8);
        content.set_margin_top(12);
        content.set_margin_bottom(12);
        content.set_margin_start(12);
        content.set_margin_end(12);
        let loading = gtk::Spinner::new();
        loading.start();
        content.append(&loading);
        dialog.set_child(Some(&content));
        let _ = dialog.add_button("Close", gtk::ResponseType::Close);
        dialog.connect_response(|dlg, _| dlg.close());

        let id = conversation.id.clone();
        let rx = crate::utils::run_async_to_main(async move { client.transfer_history(&id).await });
        let weak = Rc::downgrade(self);
        rx.attach(None, move |res| {
            content.remove(&loading);
            match res {
                Ok(records) if records.is_empty() => {
                    content.append(&gtk::Label::new(Some("No transfers yet")));
                }
                Ok(records) => {
                    for rec in records {
                        let line = format!(
                            "{} → {}   {}",
                            rec.from_agent_name,
                            rec.to_agent_name,
                            crate::format::format_date_time(&rec.created_at)
                        );
                        let label = gtk::Label::new(Some(&line));
                        label.set_halign(gtk::Align::Start);
                        content.append(&label);
                        if let Some(reason) = rec.reason.filter(|r| !r.is_empty()) {
                            let note = gtk::Label::new(Some(&format!("Note: {reason}")));
                            note.add_css_class("dim-label");
                            note.set_halign(gtk::Align::Start);
                            content.append(&note);
                        }
                    }
                }
                Err(e) => {
                    log::error!("Failed to load transfer history: {e}");
                    if let Some(view) = weak.upgrade() {
                        view.toast(&e.alert_text());
                    }
                    content.append(&gtk::Label::new(Some("Could not load transfer history")));
                }
            }
            glib::ControlFlow::Break
        });

        dialog.present();
    }
}
