use async_trait::async_trait;

/// Proposed expense category for a merchant description.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySuggestion {
    pub name: String,
    pub confidence: f32,
    pub matched_keyword: Option<String>,
}

const DEFAULT_CATEGORY: &str = "其他支出";

const KEYWORD_TABLE: &[(&str, &[&str])] = &[
    (
        "餐飲費",
        &[
            "餐廳", "食品", "飲料", "咖啡", "麵包", "便當", "小吃", "星巴克", "starbucks",
            "麥當勞", "火鍋", "壽司", "拉麵", "披薩", "早餐", "lunch", "dinner",
        ],
    ),
    (
        "交通費",
        &[
            "加油", "停車", "高鐵", "台鐵", "捷運", "uber", "計程車", "公車", "中油", "機票",
            "taxi",
        ],
    ),
    (
        "日用品",
        &[
            "全聯", "家樂福", "好市多", "costco", "屈臣氏", "7-11", "全家", "超市", "量販",
        ],
    ),
    (
        "網路購物",
        &["蝦皮", "shopee", "pchome", "momo", "amazon", "淘寶"],
    ),
    (
        "娛樂費",
        &["電影", "ktv", "遊戲", "netflix", "spotify", "youtube", "影城", "演唱會"],
    ),
    ("醫療費", &["診所", "醫院", "藥局", "牙醫", "健檢", "醫療"]),
    (
        "教育費",
        &["書店", "補習", "課程", "學費", "誠品", "udemy", "coursera"],
    ),
];

/// Keyword-driven category proposals for credit-card merchants. A match is
/// high confidence; the fallback bucket is low.
#[derive(Debug, Clone, Default)]
pub struct CategorySuggester;

impl CategorySuggester {
    #[must_use]
    pub fn suggest(&self, description: &str) -> CategorySuggestion {
        let haystack = description.to_lowercase();
        for (category, keywords) in KEYWORD_TABLE {
            for keyword in *keywords {
                if haystack.contains(&keyword.to_lowercase()) {
                    return CategorySuggestion {
                        name: (*category).to_string(),
                        confidence: 0.8,
                        matched_keyword: Some((*keyword).to_string()),
                    };
                }
            }
        }
        CategorySuggestion {
            name: DEFAULT_CATEGORY.to_string(),
            confidence: 0.3,
            matched_keyword: None,
        }
    }
}

/// Optional second pass over the keyword proposal — an LLM-backed
/// implementation can refine low-confidence buckets. The pipeline treats
/// the enhancer as best-effort and keeps the base suggestion on failure.
#[async_trait]
pub trait CategoryEnhancer: Send + Sync {
    async fn enhance(&self, description: &str, base: CategorySuggestion) -> CategorySuggestion;
}
