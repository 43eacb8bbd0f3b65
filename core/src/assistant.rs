//! Generative-AI helpers: food photo recognition and meal/exercise plans.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::CollaboratorError;
use crate::models::{ActivityLevel, Gender};

/// Fixed timeout for plan generation; other calls use the client default.
pub const PLAN_TIMEOUT: Duration = Duration::from_secs(60);

/// A monthly plan shorter than this is a repeating template.
const FULL_MONTH_DAYS: usize = 28;

const RECOGNIZE_PROMPT: &str = "這張圖片是什麼食物或餐點？請用一句簡潔、可愛的話來形容，例如：'看起來像美味的義大利麵！'、'這可能是香甜的草莓蛋糕！'、'好像是豐盛的早餐盤呢！' 如果無法辨識，請回答：'這張圖片有點模糊，小幫手還在學習中！' 不要提供卡路里數字。";

const UNRECOGNIZED_MARKER: &str = "這張圖片有點模糊";

const DESCRIPTION_FILLERS: [&str; 4] = ["！", "看起來像美味的", "這可能是香甜的", "好像是豐盛的"];

#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    /// Guess the MIME type from a file extension; JPEG otherwise.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>, extension: Option<&str>) -> Self {
        let mime_type = match extension.map(str::to_lowercase).as_deref() {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            _ => "image/jpeg",
        };
        Self {
            mime_type: mime_type.to_string(),
            data,
        }
    }
}

/// One call to a generative model.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
    /// When set the model must answer JSON matching this schema.
    pub response_schema: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
}

impl GenerateRequest {
    #[must_use]
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            response_schema: None,
            timeout: None,
        }
    }
}

#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, CollaboratorError>;
}

// --- Food recognition ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodRecognition {
    pub description: String,
    /// Cleaned description, suitable as a food name.
    pub food_name: String,
    pub estimated_calories: u32,
    pub recognized: bool,
}

/// Strip the cute phrasing so the description can be used as a food name.
#[must_use]
pub fn clean_description(description: &str) -> String {
    let mut out = description.to_string();
    for filler in DESCRIPTION_FILLERS {
        out = out.replace(filler, "");
    }
    out.trim().to_string()
}

/// Parse the calorie answer; anything that is not a non-negative integer is 0.
#[must_use]
pub fn parse_calorie_estimate(text: &str) -> u32 {
    text.trim()
        .trim_end_matches("大卡")
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

#[must_use]
pub fn calorie_prompt(food_name: &str) -> String {
    format!(
        "請估計一下一份'{food_name}'大約含有多少大卡熱量？請只回覆一個數字，不需要任何文字說明。如果無法估計，請回覆 0。"
    )
}

/// Describe a food photo, then estimate its calories.
pub async fn recognize_food(
    provider: &dyn GenerativeProvider,
    image: InlineImage,
) -> Result<FoodRecognition, CollaboratorError> {
    let request = GenerateRequest {
        prompt: RECOGNIZE_PROMPT.to_string(),
        image: Some(image),
        response_schema: None,
        timeout: None,
    };
    let description = provider.generate(&request).await?.trim().to_string();

    if description.contains(UNRECOGNIZED_MARKER) {
        return Ok(FoodRecognition {
            description,
            food_name: String::new(),
            estimated_calories: 0,
            recognized: false,
        });
    }

    let food_name = clean_description(&description);
    let answer = provider
        .generate(&GenerateRequest::text(calorie_prompt(&food_name)))
        .await?;
    let estimated_calories = parse_calorie_estimate(&answer);
    debug!(%food_name, estimated_calories, "food recognized");

    Ok(FoodRecognition {
        description,
        food_name,
        estimated_calories,
        recognized: true,
    })
}

// --- Plan generation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    #[serde(alias = "養生")]
    Wellness,
    #[serde(alias = "健康")]
    Health,
    #[serde(alias = "減肥")]
    WeightLoss,
}

impl Goal {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Wellness => "養生",
            Self::Health => "健康",
            Self::WeightLoss => "減肥",
        }
    }

    fn guidance(self) -> &'static str {
        match self {
            Self::WeightLoss => {
                "飲食應以原型食物為主，低油、低糖、高纖、足量蛋白質。每餐請提供簡單食譜或組合說明。\n運動菜單應包含有氧運動和力量訓練，並提供每項運動的時間或組數建議，以及強度標示（輕度、中等、高強度）。\n"
            }
            Self::Health => {
                "飲食應注重多樣性，色彩豐富，烹飪方式健康。每餐請提供簡單食譜或組合說明。\n運動菜單應注重全身協調和心肺功能，包含多樣化的運動類型，並提供每項運動的時間或組數建議，以及強度標示。\n"
            }
            Self::Wellness => {
                "烹飪方式以蒸、煮、燉為主，避免油炸和重口味。每餐請提供簡單食譜或組合說明。\n運動菜單應以舒緩、有助於身心放鬆和經絡通暢的運動為主，例如瑜伽、太極、散步等，並提供每項運動的時間或組數建議，以及強度標示（輕度、中等）。\n"
            }
        }
    }

    fn calorie_note(self) -> &'static str {
        match self {
            Self::WeightLoss => "",
            Self::Health => "，強調均衡營養，五大類食物都應包含",
            Self::Wellness => {
                "，強調溫和滋補、易於消化，可多使用季節性食材、藥膳食材（如紅棗、枸杞等），但避免過於複雜"
            }
        }
    }
}

impl FromStr for Goal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "養生" | "wellness" => Ok(Self::Wellness),
            "健康" | "health" => Ok(Self::Health),
            "減肥" | "weight_loss" | "weight-loss" => Ok(Self::WeightLoss),
            other => bail!("Invalid goal '{other}'. Use wellness, health, weight_loss"),
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanDuration {
    #[serde(alias = "一週")]
    Week,
    #[serde(alias = "一個月")]
    Month,
}

impl PlanDuration {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Week => "一週",
            Self::Month => "一個月",
        }
    }
}

impl FromStr for PlanDuration {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "一週" | "week" => Ok(Self::Week),
            "一個月" | "month" => Ok(Self::Month),
            other => bail!("Invalid duration '{other}'. Use week or month"),
        }
    }
}

impl fmt::Display for PlanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Daily calorie range targeted by a plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalorieRange {
    pub low: f64,
    pub high: f64,
}

#[must_use]
pub fn calorie_target_range(goal: Goal, tdee: f64) -> CalorieRange {
    match goal {
        Goal::WeightLoss => CalorieRange {
            low: (tdee - 500.0).max(0.0),
            high: tdee - 250.0,
        },
        Goal::Health => CalorieRange {
            low: tdee - 100.0,
            high: tdee + 100.0,
        },
        Goal::Wellness => CalorieRange {
            low: tdee - 200.0,
            high: tdee,
        },
    }
}

/// Everything the plan prompt is built from.
#[derive(Debug, Clone, Serialize)]
pub struct PlanRequest {
    pub goal: Goal,
    pub duration: PlanDuration,
    pub age: u32,
    pub gender: Gender,
    pub activity_level: ActivityLevel,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub bmr: f64,
    pub tdee: f64,
}

#[must_use]
pub fn build_plan_prompt(req: &PlanRequest) -> String {
    let range = calorie_target_range(req.goal, req.tdee);
    let mut prompt = format!(
        "請為一位{}歲的{}、身高{:.1}公分、體重{:.1}公斤，活動程度為'{}'的用戶，設計一個{}的{}計畫。\n",
        req.age,
        req.gender.label(),
        req.height_cm,
        req.weight_kg,
        req.activity_level.label(),
        req.duration.label(),
        req.goal.label(),
    );
    prompt.push_str(&format!(
        "根據其估計基礎代謝率 (BMR) 約 {:.0} 大卡，每日總能量消耗 (TDEE) 約 {:.0} 大卡，請提供詳細的飲食菜單和運動菜單。\n",
        req.bmr, req.tdee
    ));
    prompt.push_str(&format!(
        "飲食菜單的每日總熱量目標範圍大約在 {:.0} - {:.0} 大卡 之間{}。\n",
        range.low,
        range.high,
        req.goal.calorie_note()
    ));
    prompt.push_str(req.goal.guidance());
    match req.duration {
        PlanDuration::Week => prompt.push_str("請生成接下來7天的每日計畫。"),
        PlanDuration::Month => {
            prompt.push_str("請生成一個月的計畫，可以按週或每5-7天為一個循環提供計畫。\n");
            prompt.push_str(
                "如果內容過多，您可以提供一個通用的一週計畫並建議重複執行4次，或提供四個不同的週計畫摘要。請清晰標示每一天。",
            );
        }
    }
    prompt
}

/// JSON schema the model's plan answer must follow.
#[must_use]
pub fn plan_schema() -> serde_json::Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "day": {"type": "STRING", "description": "例如：星期一"},
                "meals": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "meal_type": {"type": "STRING", "description": "例如：早餐、午餐、晚餐、點心"},
                            "food_items": {"type": "ARRAY", "items": {"type": "STRING"}},
                            "recipe_notes": {"type": "STRING", "description": "簡單的烹飪建議或組合說明"}
                        },
                        "required": ["meal_type", "food_items"]
                    }
                },
                "exercises": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "exercise_type": {"type": "STRING", "description": "例如：慢跑、重訓、瑜伽"},
                            "duration": {"type": "STRING", "description": "例如：30分鐘"},
                            "intensity": {"type": "STRING", "description": "例如：輕度、中等、高強度"}
                        },
                        "required": ["exercise_type", "duration"]
                    }
                }
            },
            "required": ["day", "meals", "exercises"]
        }
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    pub day: String,
    #[serde(default)]
    pub meals: Vec<MealPlan>,
    #[serde(default)]
    pub exercises: Vec<ExercisePlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlan {
    pub meal_type: String,
    #[serde(default)]
    pub food_items: Vec<String>,
    pub recipe_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExercisePlan {
    pub exercise_type: String,
    pub duration: String,
    pub intensity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub goal: Goal,
    pub duration: PlanDuration,
    pub days: Vec<DayPlan>,
    /// A monthly plan that came back as a shorter cycle to repeat.
    pub condensed: bool,
}

pub async fn generate_plan(
    provider: &dyn GenerativeProvider,
    req: &PlanRequest,
) -> Result<Plan, CollaboratorError> {
    let request = GenerateRequest {
        prompt: build_plan_prompt(req),
        image: None,
        response_schema: Some(plan_schema()),
        timeout: Some(PLAN_TIMEOUT),
    };
    let text = provider.generate(&request).await?;
    let days: Vec<DayPlan> = serde_json::from_str(text.trim()).map_err(|e| {
        warn!("plan response is not valid JSON: {e}");
        CollaboratorError::Decode(e.to_string())
    })?;
    if days.is_empty() {
        return Err(CollaboratorError::Empty);
    }
    let condensed = req.duration == PlanDuration::Month && days.len() < FULL_MONTH_DAYS;
    Ok(Plan {
        goal: req.goal,
        duration: req.duration,
        days,
        condensed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays canned answers and records the requests it saw.
    struct FakeProvider {
        answers: Mutex<Vec<Result<String, CollaboratorError>>>,
        seen: Mutex<Vec<GenerateRequest>>,
    }

    impl FakeProvider {
        fn new(answers: Vec<Result<String, CollaboratorError>>) -> Self {
            Self {
                answers: Mutex::new(answers),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerativeProvider for FakeProvider {
        async fn generate(&self, request: &GenerateRequest) -> Result<String, CollaboratorError> {
            self.seen.lock().unwrap().push(request.clone());
            self.answers.lock().unwrap().remove(0)
        }
    }

    fn plan_request(goal: Goal, duration: PlanDuration) -> PlanRequest {
        PlanRequest {
            goal,
            duration,
            age: 30,
            gender: Gender::Female,
            activity_level: ActivityLevel::Light,
            height_cm: 160.0,
            weight_kg: 55.0,
            bmr: 1264.0,
            tdee: 1738.0,
        }
    }

    const ONE_DAY: &str = r#"[{"day":"星期一","meals":[{"meal_type":"早餐","food_items":["燕麥","牛奶"]}],"exercises":[{"exercise_type":"快走","duration":"30分鐘","intensity":"輕度"}]}]"#;

    #[test]
    fn calorie_ranges_by_goal() {
        let loss = calorie_target_range(Goal::WeightLoss, 2000.0);
        assert_eq!((loss.low, loss.high), (1500.0, 1750.0));
        let low = calorie_target_range(Goal::WeightLoss, 300.0);
        assert_eq!(low.low, 0.0);
        let health = calorie_target_range(Goal::Health, 2000.0);
        assert_eq!((health.low, health.high), (1900.0, 2100.0));
        let wellness = calorie_target_range(Goal::Wellness, 2000.0);
        assert_eq!((wellness.low, wellness.high), (1800.0, 2000.0));
    }

    #[test]
    fn prompt_mentions_profile_and_duration() {
        let prompt = build_plan_prompt(&plan_request(Goal::WeightLoss, PlanDuration::Week));
        assert!(prompt.contains("30歲的女性"));
        assert!(prompt.contains("身高160.0公分"));
        assert!(prompt.contains("1238 - 1488 大卡"));
        assert!(prompt.ends_with("請生成接下來7天的每日計畫。"));

        let monthly = build_plan_prompt(&plan_request(Goal::Wellness, PlanDuration::Month));
        assert!(monthly.contains("重複執行4次"));
        assert!(monthly.contains("紅棗"));
    }

    #[test]
    fn schema_requires_day_fields() {
        let schema = plan_schema();
        assert_eq!(schema["type"], "ARRAY");
        assert_eq!(
            schema["items"]["required"],
            json!(["day", "meals", "exercises"])
        );
    }

    #[tokio::test]
    async fn generate_weekly_plan() {
        let provider = FakeProvider::new(vec![Ok(ONE_DAY.to_string())]);
        let plan = generate_plan(&provider, &plan_request(Goal::Health, PlanDuration::Week))
            .await
            .unwrap();
        assert_eq!(plan.days.len(), 1);
        assert_eq!(plan.days[0].meals[0].food_items, vec!["燕麥", "牛奶"]);
        assert!(!plan.condensed);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].timeout, Some(PLAN_TIMEOUT));
        assert!(seen[0].response_schema.is_some());
    }

    #[tokio::test]
    async fn short_monthly_plan_is_condensed() {
        let provider = FakeProvider::new(vec![Ok(ONE_DAY.to_string())]);
        let plan = generate_plan(&provider, &plan_request(Goal::Health, PlanDuration::Month))
            .await
            .unwrap();
        assert!(plan.condensed);
    }

    #[tokio::test]
    async fn malformed_plan_is_decode_error() {
        let provider = FakeProvider::new(vec![Ok("not json".to_string())]);
        let err = generate_plan(&provider, &plan_request(Goal::Health, PlanDuration::Week))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Decode(_)));
    }

    #[tokio::test]
    async fn recognize_then_estimate() {
        let provider = FakeProvider::new(vec![
            Ok("看起來像美味的牛肉麵！".to_string()),
            Ok(" 550 ".to_string()),
        ]);
        let image = InlineImage::from_bytes(vec![0xff, 0xd8], Some("jpg"));
        let result = recognize_food(&provider, image).await.unwrap();
        assert!(result.recognized);
        assert_eq!(result.food_name, "牛肉麵");
        assert_eq!(result.estimated_calories, 550);

        let seen = provider.seen.lock().unwrap();
        assert!(seen[0].image.is_some());
        assert!(seen[1].prompt.contains("'牛肉麵'"));
    }

    #[tokio::test]
    async fn unrecognized_image_skips_estimate() {
        let provider = FakeProvider::new(vec![Ok(
            "這張圖片有點模糊，小幫手還在學習中！".to_string()
        )]);
        let image = InlineImage::from_bytes(vec![1], Some("png"));
        let result = recognize_food(&provider, image).await.unwrap();
        assert!(!result.recognized);
        assert_eq!(result.estimated_calories, 0);
        assert_eq!(provider.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recognition_propagates_transport_errors() {
        let provider = FakeProvider::new(vec![Err(CollaboratorError::Timeout)]);
        let image = InlineImage::from_bytes(vec![1], None);
        assert!(matches!(
            recognize_food(&provider, image).await,
            Err(CollaboratorError::Timeout)
        ));
    }

    #[test]
    fn calorie_estimate_parsing() {
        assert_eq!(parse_calorie_estimate("350"), 350);
        assert_eq!(parse_calorie_estimate("350 大卡"), 350);
        assert_eq!(parse_calorie_estimate("-20"), 0);
        assert_eq!(parse_calorie_estimate("about 300"), 0);
    }

    #[test]
    fn goal_and_duration_parse() {
        assert_eq!("減肥".parse::<Goal>().unwrap(), Goal::WeightLoss);
        assert_eq!("month".parse::<PlanDuration>().unwrap(), PlanDuration::Month);
        assert!("bulk".parse::<Goal>().is_err());
    }

    #[test]
    fn image_mime_from_extension() {
        assert_eq!(InlineImage::from_bytes(vec![], Some("PNG")).mime_type, "image/png");
        assert_eq!(InlineImage::from_bytes(vec![], None).mime_type, "image/jpeg");
    }
}
