//! Order and product lookup windows. Agents browse the shop's catalog here
//! and copy a text card of an order or product to paste into a chat.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use adw::prelude::*;
use gtk4 as gtk;

use crate::api::client::ApiClient;
use crate::api::commerce::{Order, OrderFilter, OrderStatus, Page, Product, ProductFilter};
use crate::format;

const PAGE_SIZE: u32 = 20;

/// Window chrome shared by both lookups: a search bar slot, a result list,
/// a "Load more" button and a toast overlay.
struct Shell {
    window: gtk::Window,
    bar: gtk::Box,
    list: gtk::ListBox,
    more: gtk::Button,
    overlay: adw::ToastOverlay,
}

impl Shell {
    fn new(parent: &gtk::Window, title: &str) -> Self {
        let window = gtk::Window::builder()
            .title(title)
            .transient_for(parent)
            .default_width(560)
            .default_height(640)
            .build();
        let overlay = adw::ToastOverlay::new();
        let root = gtk::Box::new(gtk::Orientation::Vertical, 8);
        root.set_margin_top(12);
        root.set_margin_bottom(12);
        root.set_margin_start(12);
        root.set_margin_end(12);

        let bar = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        root.append(&bar);

        let scroller = gtk::ScrolledWindow::builder().vexpand(true).build();
        let list = gtk::ListBox::new();
        list.add_css_class("boxed-list");
        scroller.set_child(Some(&list));
        root.append(&scroller);

        let more = gtk::Button::with_label("Load more");
        more.set_halign(gtk::Align::Center);
        more.set_visible(false);
        root.append(&more);

        overlay.set_child(Some(&root));
        window.set_child(Some(&overlay));
        Self { window, bar, list, more, overlay }
    }

    fn clear(&self) {
        while let Some(child) = self.list.first_child() {
            self.list.remove(&child);
        }
    }

    fn toast(&self, text: &str) {
        self.overlay.add_toast(adw::Toast::new(text));
    }
}

fn row(title: &str, subtitle: &str, badge: &str, color: &str) -> gtk::ListBoxRow {
    let row = gtk::ListBoxRow::new();
    let body = gtk::Box::new(gtk::Orientation::Horizontal, 8);
    body.set_margin_top(6);
    body.set_margin_bottom(6);
    body.set_margin_start(8);
    body.set_margin_end(8);

    let text = gtk::Box::new(gtk::Orientation::Vertical, 2);
    text.set_hexpand(true);
    let head = gtk::Label::new(Some(title));
    head.add_css_class("heading");
    head.set_halign(gtk::Align::Start);
    head.set_ellipsize(gtk::pango::EllipsizeMode::End);
    let sub = gtk::Label::new(Some(subtitle));
    sub.add_css_class("dim-label");
    sub.set_halign(gtk::Align::Start);
    text.append(&head);
    text.append(&sub);
    body.append(&text);

    let tag = gtk::Label::new(None);
    tag.set_markup(&format!(
        "<span foreground=\"{color}\">{}</span>",
        glib::markup_escape_text(badge)
    ));
    body.append(&tag);

    row.set_child(Some(&body));
    row
}

fn show_share_dialog(parent: &gtk::Window, title: &str, text: String) {
    let dialog = gtk::Dialog::builder()
        .title(title)
        .transient_for(parent)
        .modal(true)
        .default_width(420)
        .build();
    let label = gtk::Label::new(Some(&text));
    label.set_wrap(true);
    label.set_selectable(true);
    label.set_xalign(0.0);
    label.set_margin_top(12);
    label.set_margin_bottom(12);
    label.set_margin_start(12);
    label.set_margin_end(12);
    dialog.set_child(Some(&label));
    let _ = dialog.add_button("Close", gtk::ResponseType::Close);
    let copy = dialog.add_button("Copy", gtk::ResponseType::Accept);
    copy.add_css_class("suggested-action");
    dialog.connect_response(move |dlg, resp| {
        if resp == gtk::ResponseType::Accept {
            dlg.clipboard().set_text(&text);
        }
        dlg.close();
    });
    dialog.present();
}

fn picked_id<T>(items: &RefCell<Vec<T>>, row: &gtk::ListBoxRow, id: impl Fn(&T) -> u64) -> Option<u64> {
    let idx = usize::try_from(row.index()).ok()?;
    items.borrow().get(idx).map(id)
}

pub fn show_orders_window(parent: &gtk::Window, client: ApiClient) {
    let shell = Rc::new(Shell::new(parent, "Orders"));

    let search = gtk::SearchEntry::new();
    search.set_placeholder_text(Some("Customer name, email or phone"));
    search.set_hexpand(true);
    let mut labels = vec!["All statuses"];
    labels.extend(OrderStatus::FILTERABLE.iter().map(|s| format::order_status_label(*s)));
    let status_pick = gtk::DropDown::from_strings(&labels);
    shell.bar.append(&search);
    shell.bar.append(&status_pick);

    let orders: Rc<RefCell<Vec<Order>>> = Rc::new(RefCell::new(Vec::new()));
    let page = Rc::new(Cell::new(1u32));

    let load: Rc<dyn Fn(bool)> = {
        let client = client.clone();
        let shell = shell.clone();
        let orders = orders.clone();
        let search = search.clone();
        let status_pick = status_pick.clone();
        Rc::new(move |reset: bool| {
            if reset {
                page.set(1);
                orders.borrow_mut().clear();
                shell.clear();
            }
            // Index 0 is "All statuses".
            let filter = OrderFilter {
                status: (status_pick.selected() as usize)
                    .checked_sub(1)
                    .and_then(|i| OrderStatus::FILTERABLE.get(i).copied()),
                customer_keyword: Some(search.text().trim().to_string()),
                ..OrderFilter::default()
            };
            let client = client.clone();
            let current = page.get();
            let rx = crate::utils::run_async_to_main(async move {
                client.orders(current, PAGE_SIZE, &filter).await
            });
            let shell = shell.clone();
            let orders = orders.clone();
            let page = page.clone();
            rx.attach(None, move |res: Result<Page<Order>, _>| {
                match res {
                    Ok(result) => {
                        for order in &result.items {
                            shell.list.append(&row(
                                &format!(
                                    "{}  {}",
                                    format::format_order_number(&order.order_number),
                                    order.customer_name
                                ),
                                &format!(
                                    "{}  {}",
                                    format::format_price(order.total),
                                    format::format_date(&order.created_at)
                                ),
                                format::order_status_label(order.status),
                                format::order_status_color(order.status),
                            ));
                        }
                        orders.borrow_mut().extend(result.items);
                        shell.more.set_visible(result.page < result.total_pages);
                        page.set(current + 1);
                    }
                    Err(e) => {
                        log::warn!("Failed to load orders: {e}");
                        shell.toast(&e.alert_text());
                    }
                }
                glib::ControlFlow::Break
            });
        })
    };

    {
        let load = load.clone();
        search.connect_activate(move |_| load(true));
    }
    {
        let load = load.clone();
        status_pick.connect_selected_notify(move |_| load(true));
    }
    {
        let load = load.clone();
        shell.more.connect_clicked(move |_| load(false));
    }
    {
        let weak = Rc::downgrade(&shell);
        shell.list.connect_row_activated(move |_, row| {
            let Some(shell) = weak.upgrade() else { return };
            let Some(id) = picked_id(&orders, row, |o| o.id) else { return };
            let client = client.clone();
            let rx = crate::utils::run_async_to_main(async move { client.order_detail(id).await });
            rx.attach(None, move |res| {
                match res {
                    Ok(order) => show_share_dialog(&shell.window, "Order", format::order_share_text(&order)),
                    Err(e) => {
                        log::warn!("Failed to load order {id}: {e}");
                        shell.toast(&e.alert_text());
                    }
                }
                glib::ControlFlow::Break
            });
        });
    }

    load(true);
    shell.window.present();
}

pub fn show_products_window(parent: &gtk::Window, client: ApiClient) {
    let shell = Rc::new(Shell::new(parent, "Products"));

    let search = gtk::SearchEntry::new();
    search.set_placeholder_text(Some("Product name or SKU"));
    search.set_hexpand(true);
    let on_sale = gtk::CheckButton::with_label("On sale");
    let in_stock = gtk::CheckButton::with_label("In stock");
    shell.bar.append(&search);
    shell.bar.append(&on_sale);
    shell.bar.append(&in_stock);

    let products: Rc<RefCell<Vec<Product>>> = Rc::new(RefCell::new(Vec::new()));
    let page = Rc::new(Cell::new(1u32));

    let load: Rc<dyn Fn(bool)> = {
        let client = client.clone();
        let shell = shell.clone();
        let products = products.clone();
        let search = search.clone();
        let on_sale = on_sale.clone();
        let in_stock = in_stock.clone();
        Rc::new(move |reset: bool| {
            if reset {
                page.set(1);
                products.borrow_mut().clear();
                shell.clear();
            }
            let filter = ProductFilter {
                search: Some(search.text().trim().to_string()).filter(|s| !s.is_empty()),
                on_sale: on_sale.is_active().then_some(true),
                in_stock: in_stock.is_active().then_some(true),
                ..ProductFilter::default()
            };
            let client = client.clone();
            let current = page.get();
            let rx = crate::utils::run_async_to_main(async move {
                client.products(current, PAGE_SIZE, &filter).await
            });
            let shell = shell.clone();
            let products = products.clone();
            let page = page.clone();
            rx.attach(None, move |res: Result<Page<Product>, _>| {
                match res {
                    Ok(result) => {
                        for product in &result.items {
                            let sku = product.sku.as_deref().unwrap_or("-");
                            shell.list.append(&row(
                                &product.name,
                                &format!("{}  SKU {sku}", format::format_price(product.effective_price())),
                                format::stock_status_label(product.stock_status),
                                format::stock_status_color(product.stock_status),
                            ));
                        }
                        products.borrow_mut().extend(result.items);
                        shell.more.set_visible(result.page < result.total_pages);
                        page.set(current + 1);
                    }
                    Err(e) => {
                        log::warn!("Failed to load products: {e}");
                        shell.toast(&e.alert_text());
                    }
                }
                glib::ControlFlow::Break
            });
        })
    };

    {
        let load = load.clone();
        search.connect_activate(move |_| load(true));
    }
    for check in [&on_sale, &in_stock] {
        let load = load.clone();
        check.connect_toggled(move |_| load(true));
    }
    {
        let load = load.clone();
        shell.more.connect_clicked(move |_| load(false));
    }
    {
        let weak = Rc::downgrade(&shell);
        shell.list.connect_row_activated(move |_, row| {
            let Some(shell) = weak.upgrade() else { return };
            let Some(id) = picked_id(&products, row, |p| p.id) else { return };
            let client = client.clone();
            let rx = crate::utils::run_async_to_main(async move { client.product_detail(id).await });
            rx.attach(None, move |res| {
                match res {
                    Ok(product) => show_share_dialog(&shell.window, &product.name, format::product_share_text(&product)),
                    Err(e) => {
                        log::warn!("Failed to load product {id}: {e}");
                        shell.toast(&e.alert_text());
                    }
                }
                glib::ControlFlow::Break
            });
        });
    }

    load(true);
    shell.window.present();
}
