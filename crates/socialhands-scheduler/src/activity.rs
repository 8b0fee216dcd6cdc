//! Activity types and strategy focus.

use serde::{Deserialize, Serialize};
use socialhands_workqueue::job_types;

/// Platform action bound to a schedule slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    TwitterPost,
    TwitterReply,
    TwitterFollow,
    TwitterSearch,
    InstagramStories,
    InstagramReels,
    WebScrape,
}

impl ActivityType {
    /// Job type produced when a slot of this activity is promoted.
    pub fn job_type(&self) -> &'static str {
        match self {
            ActivityType::TwitterPost => job_types::TWITTER_POST,
            ActivityType::TwitterReply => job_types::TWITTER_REPLY,
            ActivityType::TwitterFollow => job_types::TWITTER_FOLLOW,
            ActivityType::TwitterSearch => job_types::TWITTER_SEARCH,
            ActivityType::InstagramStories => job_types::INSTAGRAM_VIEW_STORIES,
            ActivityType::InstagramReels => job_types::INSTAGRAM_VIEW_REELS,
            ActivityType::WebScrape => job_types::SCRAPE,
        }
    }
}

/// Strategy focus, boosting the priority of matching activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyFocus {
    #[default]
    Balanced,
    Growth,
    Engagement,
    Content,
}

const FOCUS_BOOST: i32 = 3;

impl StrategyFocus {
    /// Priority bonus for an activity under this focus.
    pub fn boost(&self, activity: ActivityType) -> i32 {
        use ActivityType::*;
        let focused = match self {
            StrategyFocus::Balanced => false,
            StrategyFocus::Growth => matches!(activity, TwitterFollow | TwitterSearch),
            StrategyFocus::Engagement => {
                matches!(activity, TwitterReply | InstagramStories | InstagramReels)
            }
            StrategyFocus::Content => matches!(activity, TwitterPost),
        };
        if focused { FOCUS_BOOST } else { 0 }
    }
}

impl std::str::FromStr for StrategyFocus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balanced" => Ok(StrategyFocus::Balanced),
            "growth" => Ok(StrategyFocus::Growth),
            "engagement" => Ok(StrategyFocus::Engagement),
            "content" => Ok(StrategyFocus::Content),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_mapping() {
        assert_eq!(ActivityType::TwitterPost.job_type(), "twitter-post");
        assert_eq!(ActivityType::InstagramReels.job_type(), "instagram-view-reels");
        assert_eq!(ActivityType::WebScrape.job_type(), "scrape");
    }

    #[test]
    fn test_strategy_boost() {
        assert_eq!(StrategyFocus::Balanced.boost(ActivityType::TwitterPost), 0);
        assert_eq!(StrategyFocus::Content.boost(ActivityType::TwitterPost), 3);
        assert_eq!(StrategyFocus::Growth.boost(ActivityType::TwitterFollow), 3);
        assert_eq!(StrategyFocus::Growth.boost(ActivityType::TwitterPost), 0);
        assert_eq!(StrategyFocus::Engagement.boost(ActivityType::InstagramStories), 3);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Growth".parse::<StrategyFocus>().unwrap(), StrategyFocus::Growth);
        assert!("viral".parse::<StrategyFocus>().is_err());
    }
}
