use mousetrack_core::service::dto::{DayDetail, RangeSummary};
use mousetrack_core::DistanceUnit;
use tabled::settings::object::Rows;
use tabled::settings::{Color, Modify, Style};
use tabled::{Table, Tabled};

const BAR_WIDTH: usize = 30;

#[derive(Tabled)]
struct DayRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Day")]
    weekday: String,
    #[tabled(rename = "Distance")]
    distance: String,
    #[tabled(rename = "")]
    bar: String,
}

#[derive(Tabled)]
struct HourRow {
    #[tabled(rename = "Hour")]
    hour: String,
    #[tabled(rename = "Distance")]
    distance: String,
    #[tabled(rename = "")]
    bar: String,
}

pub fn show_range(title: &str, summary: &RangeSummary, unit: DistanceUnit) {
    if summary.days.is_empty() {
        println!("No distance recorded yet.");
        return;
    }

    let max = summary
        .days
        .iter()
        .map(|d| d.total_distance)
        .fold(0.0, f64::max);

    let rows: Vec<DayRow> = summary
        .days
        .iter()
        .map(|d| DayRow {
            date: d.date.clone(),
            weekday: d.weekday.clone(),
            distance: format_distance(d.total_distance, unit),
            bar: bar(d.total_distance, max),
        })
        .collect();

    println!(
        "\n\x1b[1;36m{}\x1b[0m (Total: {}, Avg/day: {})",
        title,
        format_distance(summary.total_distance, unit),
        format_distance(summary.daily_average, unit)
    );
    println!("{}", styled(Table::new(rows)));
}

pub fn show_day(detail: &DayDetail, unit: DistanceUnit) {
    let max = detail.hours.iter().map(|h| h.distance).fold(0.0, f64::max);

    let rows: Vec<HourRow> = detail
        .hours
        .iter()
        .map(|h| HourRow {
            hour: format!("{}:00", h.hour),
            distance: if h.distance > 0.0 {
                format_distance(h.distance, unit)
            } else {
                "-".to_string()
            },
            bar: bar(h.distance, max),
        })
        .collect();

    let busiest = detail
        .busiest_hour
        .as_deref()
        .map(|h| format!(", busiest hour {}:00", h))
        .unwrap_or_default();
    println!(
        "\n\x1b[1;36m{}\x1b[0m (Total: {}{})",
        detail.date,
        format_distance(detail.total_distance, unit),
        busiest
    );
    println!("{}", styled(Table::new(rows)));
}

fn styled(mut table: Table) -> Table {
    table
        .with(Style::modern())
        .with(Modify::new(Rows::first()).with(Color::FG_CYAN)); // Header color
    table
}

fn format_distance(distance: f64, unit: DistanceUnit) -> String {
    format!("{:.2} {}", distance, unit.symbol())
}

fn bar(value: f64, max: f64) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let len = ((value / max) * BAR_WIDTH as f64).round().max(1.0) as usize;
    "█".repeat(len.min(BAR_WIDTH))
}
