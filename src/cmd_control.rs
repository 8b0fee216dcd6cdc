//! One-shot control commands run against the local database.

use chrono::{FixedOffset, NaiveDate, Utc};
use serde_json::Value;

use socialhands_scheduler::DailySchedule;

use crate::cli::DispatcherAction;
use crate::server::Services;

pub(crate) async fn enqueue(
    services: &Services,
    job_type: &str,
    data: &str,
    priority: i32,
) -> Result<(), Box<dyn std::error::Error>> {
    if !services.registry.contains(job_type) {
        return Err(format!(
            "unknown job type '{}' (known: {})",
            job_type,
            services.registry.job_types().join(", ")
        )
        .into());
    }
    let data: Value = serde_json::from_str(data)?;
    let id = services.queue.enqueue(job_type, data, priority).await?;
    println!("{}", id);
    Ok(())
}

pub(crate) async fn dispatcher(
    services: &Services,
    action: DispatcherAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = services.dispatcher();
    match action {
        DispatcherAction::Start => {
            let id = dispatcher.start().await?;
            println!("Dispatcher started (start-agent job {})", id);
        }
        DispatcherAction::Stop => {
            dispatcher.stop().await?;
            println!("Dispatcher stopped");
        }
        DispatcherAction::Status => {
            let state = if dispatcher.is_active().await? {
                "active"
            } else {
                "inactive"
            };
            println!("Dispatcher is {}", state);
        }
    }
    Ok(())
}

pub(crate) async fn status(services: &Services) -> Result<(), Box<dyn std::error::Error>> {
    let report = services.status_collector().collect(Utc::now()).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub(crate) async fn schedule(
    services: &Services,
    date: Option<NaiveDate>,
) -> Result<(), Box<dyn std::error::Error>> {
    let date = date.unwrap_or_else(|| services.schedule.local_date(Utc::now()));
    let schedule = services.schedule.schedule_for(date).await?;
    let offset = FixedOffset::east_opt(services.config.scheduler.utc_offset_minutes * 60)
        .ok_or("scheduler.utc_offset_minutes is out of range")?;
    print!("{}", render_schedule(&schedule, offset));
    Ok(())
}

fn render_schedule(schedule: &DailySchedule, offset: FixedOffset) -> String {
    let progress = schedule.progress();
    let mut out = format!(
        "{} ({:?}): {} slots, {} completed, {} failed, {} skipped\n",
        schedule.date,
        schedule.strategy,
        progress.total,
        progress.completed,
        progress.failed,
        progress.skipped
    );
    for slot in &schedule.slots {
        out.push_str(&format!(
            "  {}-{}  {:<18} {:<12} {}{}\n",
            slot.start_time.with_timezone(&offset).format("%H:%M"),
            slot.end_time.with_timezone(&offset).format("%H:%M"),
            slot.activity_type.job_type(),
            format!("{:?}", slot.status).to_lowercase(),
            slot.task_id,
            if slot.is_flexible { "" } else { " (fixed)" },
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use socialhands_scheduler::{ActivityType, ScheduleSlot, StrategyFocus};

    #[test]
    fn test_render_schedule_uses_local_time() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();
        let slot = ScheduleSlot::new(
            "TWITTER_POST_CONTENT",
            ActivityType::TwitterPost,
            start,
            start + chrono::Duration::minutes(15),
            5,
            false,
        );
        let schedule = DailySchedule::new(date, StrategyFocus::Balanced, vec![slot]);

        let text = render_schedule(&schedule, FixedOffset::east_opt(2 * 3600).unwrap());
        assert!(text.starts_with("2024-05-01 (Balanced): 1 slots"));
        assert!(text.contains("09:00-09:15"));
        assert!(text.contains("twitter-post"));
        assert!(text.contains("scheduled"));
        assert!(text.contains("(fixed)"));
    }
}
