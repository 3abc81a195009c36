use std::rc::Rc;

use adw::prelude::*;
use adw::Application;
use gtk4 as gtk;

use crate::api::models::{Agent, AgentStatus};
use crate::api::ApiError;
use crate::app::AppState;
use crate::session::Session;
use crate::storage::Storage;

pub fn show_login_window(app: &Application) {
    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("Agent Login")
        .default_width(420)
        .default_height(320)
        .resizable(false)
        .build();

    let toast_overlay = adw::ToastOverlay::new();

    let root = gtk::Box::new(gtk::Orientation::Vertical, 12);
    root.set_margin_top(24);
    root.set_margin_bottom(24);
    root.set_margin_start(24);
    root.set_margin_end(24);

    let title = gtk::Label::new(Some("Sign in to the agent desk"));
    title.add_css_class("title-2");
    title.set_halign(gtk::Align::Start);
    root.append(&title);

    let state = AppState::load();

    let server_entry = gtk::Entry::new();
    server_entry.set_placeholder_text(Some("Shop URL (e.g. https://shop.example.com)"));
    server_entry.set_hexpand(true);
    server_entry.set_text(&state.base_url);

    let agent_entry = gtk::Entry::new();
    agent_entry.set_placeholder_text(Some("Agent ID"));
    agent_entry.set_hexpand(true);
    agent_entry.set_text(&state.agent_id);

    let pass_entry = gtk::PasswordEntry::new();
    pass_entry.set_placeholder_text(Some("Password"));
    pass_entry.set_hexpand(true);

    let form = gtk::Box::new(gtk::Orientation::Vertical, 8);
    form.append(&server_entry);
    form.append(&agent_entry);
    form.append(&pass_entry);
    root.append(&form);

    let status = gtk::Label::new(None);
    status.add_css_class("dim-label");
    status.set_halign(gtk::Align::Start);
    root.append(&status);

    let login_btn = gtk::Button::with_label("Log in");
    login_btn.add_css_class("suggested-action");
    login_btn.set_halign(gtk::Align::End);
    root.append(&login_btn);

    toast_overlay.set_child(Some(&root));
    let container = gtk::Box::new(gtk::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    header.set_title_widget(Some(&gtk::Label::new(Some("Tanzanite Agent Desk"))));
    container.append(&header);
    container.append(&toast_overlay);
    window.set_content(Some(&container));

    let on_login = {
        let app = app.clone();
        let window = window.clone();
        let overlay = toast_overlay.clone();
        let server_entry = server_entry.clone();
        let agent_entry = agent_entry.clone();
        let pass_entry = pass_entry.clone();
        let login_btn = login_btn.clone();
        move || {
            let url = crate::utils::normalize_url(&server_entry.text());
            let agent_id = agent_entry.text().trim().to_string();
            let password = pass_entry.text().to_string();
            if url.is_empty() || agent_id.is_empty() || password.is_empty() {
                overlay.add_toast(adw::Toast::new("Please enter the shop URL, agent ID and password"));
                return;
            }

            let mut st = AppState::load();
            st.base_url = url;
            st.agent_id = agent_id.clone();
            if let Err(e) = st.save() {
                log::error!("Failed to save settings: {e}");
                overlay.add_toast(adw::Toast::new(&format!("Failed to save settings: {e}")));
            }

            let storage = match Storage::open_default() {
                Ok(s) => s,
                Err(e) => {
                    log::error!("Cannot open local storage: {e}");
                    overlay.add_toast(adw::Toast::new("Cannot open local storage"));
                    return;
                }
            };
            let mut session = match Session::from_state(&st, storage) {
                Ok(s) => s,
                Err(e) => {
                    overlay.add_toast(adw::Toast::new(&e.alert_text()));
                    return;
                }
            };

            status.set_label("Signing in…");
            login_btn.set_sensitive(false);

            let rx: glib::Receiver<Result<Agent, ApiError>> = crate::utils::run_async_to_main(async move {
                let agent = session.login(&agent_id, &password).await?;
                if let Err(e) = session.client().update_status(AgentStatus::Online).await {
                    log::warn!("Could not mark agent online: {e}");
                }
                Ok(agent)
            });

            let status = status.clone();
            let login_btn = login_btn.clone();
            let app = app.clone();
            let window = window.clone();
            let overlay = overlay.clone();
            rx.attach(None, move |res| {
                login_btn.set_sensitive(true);
                match res {
                    Ok(agent) => {
                        status.set_label(&format!("Welcome, {}", agent.name));
                        crate::ui::main_window::show_main_window(&app);
                        window.close();
                    }
                    Err(err) => {
                        log::warn!("Login failed: {err}");
                        status.set_label("Login failed");
                        overlay.add_toast(adw::Toast::new(&err.alert_text()));
                    }
                }
                glib::ControlFlow::Break
            });
        }
    };

    let on_login: Rc<dyn Fn()> = Rc::new(on_login);
    {
        let on_login = on_login.clone();
        login_btn.connect_clicked(move |_| (on_login)());
    }
    {
        let on_login = on_login.clone();
        agent_entry.connect_activate(move |_| (on_login)());
    }
    {
        let on_login = on_login.clone();
        pass_entry.connect_activate(move |_| (on_login)());
    }

    window.present();
}
