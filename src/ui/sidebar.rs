use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use gtk4 as gtk;
use gtk4::prelude::*;

use crate::api::models::{ContactPresence, Conversation};

pub struct Sidebar {
    root: gtk::Box,
    title: gtk::Label,
    note: gtk::Label,
    list: gtk::ListBox,
    items: RefCell<Vec<Conversation>>,
    online: RefCell<HashSet<String>>,
}

impl Sidebar {
    pub fn new() -> Rc<Self> {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 6);
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);
        root.set_width_request(280);

        let title = gtk::Label::new(Some("Conversations"));
        title.add_css_class("heading");
        title.set_halign(gtk::Align::Start);
        root.append(&title);

        let note = gtk::Label::new(None);
        note.add_css_class("dim-label");
        note.add_css_class("caption");
        note.set_halign(gtk::Align::Start);
        note.set_visible(false);
        root.append(&note);

        let scroller = gtk::ScrolledWindow::builder().vexpand(true).build();
        let list = gtk::ListBox::new();
        list.add_css_class("navigation-sidebar");
        scroller.set_child(Some(&list));
        root.append(&scroller);

        Rc::new(Self {
            root,
            title,
            note,
            list,
            items: RefCell::new(Vec::new()),
            online: RefCell::new(HashSet::new()),
        })
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    /// Small line under the title, hidden when `None`.
    pub fn set_note(&self, note: Option<&str>) {
        self.note.set_label(note.unwrap_or(""));
        self.note.set_visible(note.is_some());
    }

    pub fn set_presence(&self, contacts: &[ContactPresence]) {
        let online = ContactPresence::online_ids(contacts);
        if *self.online.borrow() == online {
            return;
        }
        *self.online.borrow_mut() = online;
        let items = self.items.borrow().clone();
        self.set_items(items);
    }

    pub fn set_items(&self, items: Vec<Conversation>) {
        while let Some(child) = self.list.first_child() {
            self.list.remove(&child);
        }
        let unread: u64 = items.iter().map(Conversation::unread).sum();
        if unread > 0 {
            self.title.set_label(&format!("Conversations ({unread} unread)"));
        } else {
            self.title.set_label("Conversations");
        }
        {
            let online = self.online.borrow();
            for conv in &items {
                self.list.append(&Self::row(conv, online.contains(&conv.id)));
            }
        }
        *self.items.borrow_mut() = items;
    }

    fn row(conv: &Conversation, online: bool) -> gtk::ListBoxRow {
        let row = gtk::ListBoxRow::new();
        let body = gtk::Box::new(gtk::Orientation::Vertical, 2);
        body.set_margin_top(6);
        body.set_margin_bottom(6);
        body.set_margin_start(8);
        body.set_margin_end(8);

        let top = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        if online {
            let dot = gtk::Label::new(Some("●"));
            dot.add_css_class("success");
            dot.set_tooltip_text(Some("Visitor online"));
            top.append(&dot);
        }
        let name = gtk::Label::new(Some(conv.title()));
        name.add_css_class("heading");
        name.set_halign(gtk::Align::Start);
        name.set_hexpand(true);
        name.set_ellipsize(gtk::pango::EllipsizeMode::End);
        top.append(&name);
        if conv.unread() > 0 {
            let badge = gtk::Label::new(Some(&conv.unread().to_string()));
            badge.add_css_class("accent");
            top.append(&badge);
        }
        let when = gtk::Label::new(Some(&crate::format::format_relative_now(conv.activity_at())));
        when.add_css_class("dim-label");
        when.add_css_class("caption");
        top.append(&when);
        body.append(&top);

        let preview = gtk::Label::new(Some(conv.preview()));
        preview.add_css_class("dim-label");
        preview.set_halign(gtk::Align::Start);
        preview.set_ellipsize(gtk::pango::EllipsizeMode::End);
        body.append(&preview);

        row.set_child(Some(&body));
        row
    }

    pub fn connect_selected<F: Fn(Conversation) + 'static>(self: &Rc<Self>, f: F) {
        let weak = Rc::downgrade(self);
        self.list.connect_row_activated(move |_, row| {
            let Some(sidebar) = weak.upgrade() else { return };
            let picked = usize::try_from(row.index())
                .ok()
                .and_then(|idx| sidebar.items.borrow().get(idx).cloned());
            if let Some(conv) = picked {
                f(conv);
            }
        });
    }
}
