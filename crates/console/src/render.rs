use rise_client_sdk::{
    list::{ListController, ListView, PageInfo},
    screens::OverviewCounts,
    Record,
};
use rise_protocol::{BugReport, MediaItem, UserRecord};

const NA: &str = "N/A";

/// Left-aligned columns sized to their widest cell.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let mut out = vec![line(headers, &widths)];
    out.push(widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("  "));
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push(line(&cells, &widths));
    }
    out.join("\n")
}

fn line(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:<w$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

fn pager(info: &PageInfo) -> String {
    let prev = if info.has_previous() { "[prev]" } else { "(prev)" };
    let next = if info.has_next() { "[next]" } else { "(next)" };
    format!(
        "{prev} Page {} of {} {next}   showing {}-{} of {}",
        info.page,
        info.total_pages.max(1),
        info.start + 1,
        info.end,
        info.filtered_count
    )
}

pub fn list<R: Record>(
    controller: &ListController<R>,
    headers: &[&str],
    row: impl Fn(&R) -> Vec<String>,
) -> String {
    let label = controller.config().item_label;
    match controller.view() {
        ListView::Loading => "Loading...".to_string(),
        ListView::Error(message) => format!("Error: {message}"),
        ListView::Empty => format!("No {label}s found."),
        ListView::NoResults => "No results match your search.".to_string(),
        ListView::Page { rows, info } => {
            let rows: Vec<Vec<String>> = rows.into_iter().map(&row).collect();
            let mut out = table(headers, &rows);
            if controller.config().page_size.is_some() {
                out.push('\n');
                out.push_str(&pager(&info));
            }
            out
        }
    }
}

fn or_na(value: &Option<String>) -> String {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or(NA)
        .to_string()
}

pub fn media(controller: &ListController<MediaItem>) -> String {
    list(controller, &["ID", "Title", "Category", "Description"], |item| {
        vec![
            item.id.clone(),
            item.title.clone(),
            item.categories.clone(),
            item.description.clone(),
        ]
    })
}

pub fn subscribers(controller: &ListController<UserRecord>) -> String {
    list(
        controller,
        &["Name", "Email", "Phone", "Age", "Gender", "Plan", "Start", "End"],
        |user| {
            let date = |d: &Option<chrono::DateTime<chrono::Utc>>| {
                d.map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| NA.to_string())
            };
            vec![
                or_na(&user.display_name),
                or_na(&user.email),
                or_na(&user.phone_number),
                or_na(&user.age),
                or_na(&user.gender),
                user.plan_label().to_string(),
                date(&user.start_date),
                date(&user.plan_end_date),
            ]
        },
    )
}

pub fn admins(controller: &ListController<UserRecord>) -> String {
    list(controller, &["ID", "Name", "Email", "Phone"], |user| {
        vec![
            user.id.clone(),
            or_na(&user.display_name),
            or_na(&user.email),
            or_na(&user.phone_number),
        ]
    })
}

pub fn bugs(controller: &ListController<BugReport>) -> String {
    list(controller, &["ID", "Subject", "Status", "Description"], |bug| {
        vec![
            bug.id.clone(),
            bug.subject.clone(),
            bug.status_label().to_string(),
            bug.description.clone(),
        ]
    })
}

pub fn overview(counts: &OverviewCounts) -> String {
    table(
        &["Courses", "Sounds", "Subscribers"],
        &[vec![
            counts.courses.to_string(),
            counts.sounds.to_string(),
            counts.subscribers.to_string(),
        ]],
    )
}

pub fn profile(user: &UserRecord) -> String {
    let age = user
        .age
        .as_deref()
        .filter(|a| !a.is_empty())
        .map(|a| format!("{a} years"))
        .unwrap_or_else(|| NA.to_string());
    format!(
        "{}\n{}\n{}\n{}",
        or_na(&user.display_name),
        or_na(&user.email),
        or_na(&user.phone_number),
        age
    )
}
