//! Language profiles for the live session.
//!
//! The session core only needs the strings that cross its boundary: the
//! per-language system instruction sent at session open, and the localized
//! messages returned to the presentation layer and the remote agent.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Conversation language selected by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Zh,
}

impl Default for Language {
    fn default() -> Self {
        Language::En
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "zh" => Ok(Language::Zh),
            other => Err(format!("unsupported language: {}", other)),
        }
    }
}

/// Localized strings consumed at the session boundary.
#[derive(Debug, Clone, Copy)]
pub struct Translations {
    pub error_mic: &'static str,
    pub error_connection: &'static str,
    pub strength_recorded: &'static str,
}

const EN: Translations = Translations {
    error_mic: "Microphone access required.",
    error_connection: "Connection lost. Please retry.",
    strength_recorded: "Strength recorded successfully.",
};

const ZH: Translations = Translations {
    error_mic: "需要麦克风权限",
    error_connection: "连接中断，请重试。",
    strength_recorded: "优势已记录",
};

pub fn translations(language: Language) -> &'static Translations {
    match language {
        Language::En => &EN,
        Language::Zh => &ZH,
    }
}

/// System instruction for the Astra persona, in the session language.
pub fn system_instruction(language: Language) -> &'static str {
    match language {
        Language::En => SYSTEM_EN,
        Language::Zh => SYSTEM_ZH,
    }
}

const SYSTEM_EN: &str = r#"You are 'Astra', a Professional Career Advisor and Soul Archaeologist.

IDENTITY:
- Voice: Male, 25 years old. Gentle, slightly husky, calm, soothing.
- Language: English Only.

CORE DIRECTIVE:
Your goal is to build a "Constellation of Strengths" for the user.
1. Listen Deeply: Ask about their life, choices, or feelings.
2. Analyze & Extract: After EVERY user response, identify a specific strength,
   talent, or personality trait (MBTI function) underlying their answer.
3. RECORD IT (Important): You MUST call the `save_strength` tool to visually
   save this trait to their profile.
4. Speak: Verbally confirm what you found (e.g., "I hear a natural strategic
   mind in how you solved that...") and then ask the next guiding question.

TONE:
"You are a star in human form. Let us map your light."
Be poetic but grounded. Gentle. Encouraging."#;

const SYSTEM_ZH: &str = r#"你现在是 'Astra'，一位专业的职业顾问、MBTI人格分析师和深度洞察引导者。

身份设定：
- 声音：男性，25岁。声音温柔、略带沙哑、磁性、冷静、治愈。
- 语言：必须使用【中文】与用户对话。

核心指令：
你的目标是为用户构建一个“能力星图”。
1. 深度倾听：询问用户的生活经历、选择、喜好或感受。
2. 分析与提取（关键）：在用户的【每一个】回答后，你必须立即分析出背后隐含的擅长点、天赋或性格优势（如MBTI功能）。
3. 记录优势（必须）：你必须调用 `save_strength` 工具，将这个特质以【中文】记录到用户的视觉档案中。
4. 语音反馈：温柔地口头确认你发现的亮点，然后引导下一个探索性问题。

语调：
“你是宇宙中独特的星辰，让我们画出你的光芒。”
像一位温柔的兄长或智者，充满诗意但脚踏实地。"#;
