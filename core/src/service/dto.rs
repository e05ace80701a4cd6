use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub date: String,
    pub weekday: String,
    pub total_distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourSummary {
    pub hour: String,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayDetail {
    pub date: String,
    pub total_distance: f64,
    pub hours: Vec<HourSummary>, // always 24 entries, "00".."23"
    pub busiest_hour: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeSummary {
    pub days: Vec<DaySummary>,
    pub total_distance: f64,
    pub daily_average: f64,
}
