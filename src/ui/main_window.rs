use std::rc::Rc;

use adw::prelude::*;
use adw::Application;

use crate::api::models::{AgentStatus, ContactPresence, Conversation};
use crate::app::AppState;
use crate::session::Session;
use crate::storage::Storage;

const CACHED_CONVERSATIONS: usize = 200;

pub fn show_main_window(app: &Application) {
    let state = AppState::load();
    let session = match Storage::open_default()
        .map_err(|e| e.to_string())
        .and_then(|storage| Session::from_state(&state, storage).map_err(|e| e.to_string()))
    {
        Ok(session) => session,
        Err(e) => {
            log::error!("Cannot start session: {e}");
            crate::ui::login::show_login_window(app);
            return;
        }
    };
    let agent = session.stored_agent().unwrap_or_default();
    let agent_name = match (agent.name.is_empty(), agent.agent_id.is_empty()) {
        (false, _) => agent.name.clone(),
        (true, false) => agent.agent_id.clone(),
        (true, true) => "Agent".to_string(),
    };

    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("Tanzanite Agent Desk")
        .default_width(1024)
        .default_height(680)
        .build();

    let overlay = adw::ToastOverlay::new();

    let split = adw::Flap::builder()
        .reveal_flap(true)
        .locked(true)
        .modal(false)
        .build();

    let sidebar = crate::ui::sidebar::Sidebar::new();
    split.set_flap(Some(&sidebar.widget()));

    let chat = crate::ui::chat_view::ChatView::new(overlay.clone(), state.message_poll_period());
    split.set_content(Some(&chat.widget()));
    overlay.set_child(Some(&split));

    let container = gtk4::Box::new(gtk4::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    let title = gtk4::Label::new(Some(&agent_name));
    title.add_css_class("heading");
    header.set_title_widget(Some(&title));

    let labels: Vec<&str> = AgentStatus::ALL.iter().map(AgentStatus::label).collect();
    let status_picker = gtk4::DropDown::from_strings(&labels);
    status_picker.set_tooltip_text(Some("Availability"));
    header.pack_start(&status_picker);

    let orders_btn = gtk4::Button::with_label("Orders");
    let products_btn = gtk4::Button::with_label("Products");
    header.pack_start(&orders_btn);
    header.pack_start(&products_btn);

    let logout_btn = gtk4::Button::with_label("Log out");
    let notif_btn = gtk4::Button::with_label("Notifications");
    header.pack_end(&logout_btn);
    header.pack_end(&notif_btn);

    container.append(&header);
    container.append(&overlay);
    window.set_content(Some(&container));
    window.present();

    match session.storage().conversations(Some(CACHED_CONVERSATIONS)) {
        Ok(cached) if !cached.is_empty() => {
            sidebar.set_items(cached);
            match session.storage().conversations_cached_at() {
                Ok(Some(at)) => {
                    let now = chrono::Local::now().naive_local();
                    sidebar.set_note(Some(&crate::format::format_cache_age(at, now)));
                }
                Ok(None) => {}
                Err(e) => log::warn!("Cannot read conversation cache age: {e}"),
            }
        }
        Ok(_) => {}
        Err(e) => log::warn!("Cannot read cached conversations: {e}"),
    }

    {
        let chat = chat.clone();
        let client = session.client().clone();
        sidebar.connect_selected(move |conv| chat.open(conv, client.clone()));
    }

    let refresh: Rc<dyn Fn()> = {
        let client = session.client().clone();
        let storage = session.storage().clone();
        let sidebar = sidebar.clone();
        let overlay = overlay.clone();
        let agent_id = agent.agent_id.clone();
        Rc::new(move || {
            let client = client.clone();
            let storage = storage.clone();
            let agent_id = agent_id.clone();
            let rx = crate::utils::run_async_to_main(async move {
                let items = client.conversations("active", 1).await?;
                if let Err(e) = storage.replace_conversations(&items) {
                    log::warn!("Failed to cache conversations: {e}");
                }
                let presence = if agent_id.is_empty() {
                    Vec::new()
                } else {
                    client.batch_presence(&agent_id).await
                };
                Ok::<(Vec<Conversation>, Vec<ContactPresence>), crate::api::ApiError>((items, presence))
            });
            let sidebar = sidebar.clone();
            let overlay = overlay.clone();
            rx.attach(None, move |res| {
                match res {
                    Ok((items, presence)) => {
                        sidebar.set_note(None);
                        sidebar.set_items(items);
                        sidebar.set_presence(&presence);
                    }
                    Err(err) => {
                        log::warn!("Conversation refresh failed: {err}");
                        overlay.add_toast(adw::Toast::new(&err.alert_text()));
                    }
                }
                glib::ControlFlow::Break
            });
        })
    };
    refresh();
    {
        let refresh = refresh.clone();
        let win = window.downgrade();
        let secs = u32::try_from(state.conversation_refresh_period().as_secs()).unwrap_or(u32::MAX);
        glib::timeout_add_seconds_local(secs, move || {
            if win.upgrade().is_none() {
                return glib::ControlFlow::Break;
            }
            refresh();
            glib::ControlFlow::Continue
        });
    }

    set_status(&session, &overlay, AgentStatus::Online);
    {
        let session = session.clone();
        let overlay = overlay.clone();
        status_picker.connect_selected_notify(move |picker| {
            if let Some(status) = AgentStatus::ALL.get(picker.selected() as usize) {
                set_status(&session, &overlay, *status);
            }
        });
    }

    {
        let client = session.client().clone();
        let window = window.clone();
        orders_btn.connect_clicked(move |_| {
            crate::ui::catalog::show_orders_window(window.upcast_ref(), client.clone());
        });
    }
    {
        let client = session.client().clone();
        let window = window.clone();
        products_btn.connect_clicked(move |_| {
            crate::ui::catalog::show_products_window(window.upcast_ref(), client.clone());
        });
    }
    {
        let client = session.client().clone();
        let window = window.clone();
        let overlay = overlay.clone();
        notif_btn.connect_clicked(move |_| show_notifications(&window, &overlay, client.clone()));
    }
    {
        let session = session.clone();
        let app = app.clone();
        let window = window.clone();
        logout_btn.connect_clicked(move |_| {
            let mut session = session.clone();
            let rx = crate::utils::run_async_to_main(async move {
                if let Err(e) = session.client().update_status(AgentStatus::Offline).await {
                    log::warn!("Failed to set status {} before logout: {e}", AgentStatus::Offline.as_str());
                }
                session.logout().await;
                Ok::<(), ()>(())
            });
            let app = app.clone();
            let window = window.clone();
            rx.attach(None, move |_| {
                crate::ui::login::show_login_window(&app);
                window.close();
                glib::ControlFlow::Break
            });
        });
    }
}

fn set_status(session: &Session, overlay: &adw::ToastOverlay, status: AgentStatus) {
    let client = session.client().clone();
    let rx = crate::utils::run_async_to_main(async move { client.update_status(status).await });
    let overlay = overlay.clone();
    rx.attach(None, move |res| {
        if let Err(e) = res {
            log::warn!("Failed to set status {}: {e}", status.as_str());
            overlay.add_toast(adw::Toast::new("Could not update your status"));
        }
        glib::ControlFlow::Break
    });
}

fn show_notifications(
    window: &adw::ApplicationWindow,
    overlay: &adw::ToastOverlay,
    client: crate::api::client::ApiClient,
) {
    let dialog = gtk4::Dialog::builder()
        .title("Notifications")
        .transient_for(window)
        .modal(true)
        .default_width(420)
        .default_height(480)
        .build();
    let scroller = gtk4::ScrolledWindow::builder().vexpand(true).build();
    let list = gtk4::Box::new(gtk4::Orientation::Vertical, 8);
    list.set_margin_top(12);
    list.set_margin_bottom(12);
    list.set_margin_start(12);
    list.set_margin_end(12);
    scroller.set_child(Some(&list));
    dialog.set_child(Some(&scroller));
    let _ = dialog.add_button("Mark all read", gtk4::ResponseType::Apply);
    let _ = dialog.add_button("Close", gtk4::ResponseType::Close);

    let fetch = client.clone();
    let rx = crate::utils::run_async_to_main(async move { fetch.notifications(false).await });
    {
        let overlay = overlay.clone();
        rx.attach(None, move |res| {
            match res {
                Ok(items) if items.is_empty() => list.append(&gtk4::Label::new(Some("Nothing new"))),
                Ok(items) => {
                    for n in items {
                        let row = gtk4::Box::new(gtk4::Orientation::Vertical, 2);
                        let head = gtk4::Label::new(Some(&n.title));
                        head.set_halign(gtk4::Align::Start);
                        if !n.is_read {
                            head.add_css_class("heading");
                        }
                        let body = gtk4::Label::new(Some(&n.content));
                        body.set_wrap(true);
                        body.set_xalign(0.0);
                        let when = gtk4::Label::new(Some(&crate::format::format_relative_now(&n.created_at)));
                        when.add_css_class("dim-label");
                        when.add_css_class("caption");
                        when.set_halign(gtk4::Align::Start);
                        row.append(&head);
                        row.append(&body);
                        row.append(&when);
                        list.append(&row);
                    }
                }
                Err(e) => {
                    log::warn!("Failed to load notifications: {e}");
                    overlay.add_toast(adw::Toast::new(&e.alert_text()));
                }
            }
            glib::ControlFlow::Break
        });
    }

    dialog.connect_response(move |dlg, resp| {
        if resp == gtk4::ResponseType::Apply {
            let client = client.clone();
            crate::utils::spawn_async(async move {
                if let Err(e) = client.mark_all_notifications_read().await {
                    log::warn!("Failed to mark notifications read: {e}");
                }
            });
        }
        dlg.close();
    });
    dialog.present();
}
