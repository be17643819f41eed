//! Synthetic prompt text sized to a token target.
//!
//! Filler is built by cycling a fixed pool of CJK sentences. Most tokenizers
//! spend roughly one token per CJK character, so character count is a usable
//! proxy for token count without shipping a tokenizer. The ratio is
//! configurable for endpoints whose tokenizer behaves differently.
//!
//! Needle documents splice a single fact into the filler at a chosen
//! relative position and end with a question about it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default characters per token for the built-in CJK filler.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 1.0;

/// Default needle fact.
pub const DEFAULT_NEEDLE_FACT: &str = "The secret passphrase for the archive vault is AMBER-FALCON-42.";

/// Expected answer for [`DEFAULT_NEEDLE_FACT`].
pub const DEFAULT_NEEDLE_ANSWER: &str = "AMBER-FALCON-42";

/// Question appended to every needle document.
pub const NEEDLE_QUESTION: &str =
    "What is the one English-language fact hidden in the document above? Reply with that fact only.";

/// Instruction heading plain context probes.
pub const CONTEXT_INSTRUCTION: &str =
    "The text below is filler for a capacity test. Ignore it and reply with the single word OK.";

/// Instruction heading max-output probes.
pub const OUTPUT_INSTRUCTION: &str = "Using the notes below as loose inspiration, write an extremely \
long and detailed essay. Keep writing until you are stopped. Do not summarize and do not conclude.";

const NEEDLE_PREAMBLE: &str = "Read the following document carefully. One English sentence is hidden \
somewhere inside it. Answer the question at the end using only the document.";

/// How far past the split point to look for a sentence boundary.
const BOUNDARY_SEARCH_WINDOW: usize = 64;

const SAMPLE_SENTENCES: &[&str] = &[
    "清晨的山谷里雾气缓缓升起，远处传来几声鸟鸣，溪水沿着石缝一路向东流去。",
    "图书馆的旧书架上摆满了泛黄的地图，每一张都记录着不同年代的城市轮廓。",
    "工程师们在会议室里反复讨论方案，白板上写满了公式、箭头和待办事项。",
    "秋天的稻田一望无际，风吹过时金色的稻浪起伏，农民们正忙着准备收割。",
    "港口的灯塔每隔十秒闪烁一次，为夜里归航的渔船指引方向。",
    "老街的茶馆里坐着几位下棋的老人，棋盘旁边的茶水早已凉透。",
    "研究人员记录了连续三十天的气温变化，并把数据整理成详细的表格。",
    "列车穿过长长的隧道后，窗外忽然出现一片开阔的湖面，阳光洒在水上。",
    "小镇的集市每逢周末开放，摊位上有新鲜的蔬菜、手工布鞋和竹编篮子。",
    "天文台的望远镜对准了北方的星空，观测员在笔记本上标出每颗星的位置。",
    "博物馆新展出了一批青铜器，讲解员耐心地介绍它们的铸造工艺和用途。",
    "雨后的城市街道格外干净，行人撑着伞匆匆走过，路边的梧桐叶闪着水光。",
];

/// Where a needle is placed inside the filler body.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NeedlePosition {
    /// After the last filler sentence, just before the question.
    End,
    /// Halfway through the body.
    Middle,
    /// 80% of the way through the body.
    Percent80,
}

impl NeedlePosition {
    /// All positions, in probing order.
    pub const ALL: [NeedlePosition; 3] = [
        NeedlePosition::End,
        NeedlePosition::Middle,
        NeedlePosition::Percent80,
    ];

    /// Relative offset within the body.
    pub fn fraction(self) -> f64 {
        match self {
            NeedlePosition::End => 1.0,
            NeedlePosition::Middle => 0.5,
            NeedlePosition::Percent80 => 0.8,
        }
    }
}

impl fmt::Display for NeedlePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NeedlePosition::End => write!(f, "end"),
            NeedlePosition::Middle => write!(f, "middle"),
            NeedlePosition::Percent80 => write!(f, "80%"),
        }
    }
}

impl FromStr for NeedlePosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "end" => Ok(NeedlePosition::End),
            "middle" | "mid" | "50" | "50%" => Ok(NeedlePosition::Middle),
            "80" | "80%" | "percent80" => Ok(NeedlePosition::Percent80),
            other => Err(format!(
                "unknown needle position '{other}' (expected end, middle, or 80%)"
            )),
        }
    }
}

/// A needle document and its parts.
#[derive(Debug, Clone)]
pub struct NeedleDocument {
    /// Full prompt text: preamble, body (with needle), question.
    pub text: String,
    pub preamble: String,
    /// Filler with the needle spliced in.
    pub body: String,
    pub needle: String,
    pub question: String,
    /// Character offset of the needle inside `body`.
    pub needle_offset: usize,
}

/// Builds filler text approximating a token count.
#[derive(Debug, Clone)]
pub struct TestDataGenerator {
    chars_per_token: f64,
}

impl Default for TestDataGenerator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl TestDataGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the characters-per-token ratio. Non-positive values fall
    /// back to the default.
    pub fn with_chars_per_token(mut self, ratio: f64) -> Self {
        self.chars_per_token = if ratio > 0.0 && ratio.is_finite() {
            ratio
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        self
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }

    /// Approximate token count of `text` under this generator's ratio.
    pub fn estimate_tokens(&self, text: &str) -> u32 {
        (text.chars().count() as f64 / self.chars_per_token).ceil() as u32
    }

    fn target_chars(&self, tokens: u32) -> usize {
        (f64::from(tokens) * self.chars_per_token).round() as usize
    }

    /// Filler text of roughly `target_tokens` tokens.
    pub fn generate(&self, target_tokens: u32) -> String {
        let target = self.target_chars(target_tokens);
        let mut text = String::with_capacity(target * 3);
        let mut chars = 0;
        for sentence in SAMPLE_SENTENCES.iter().cycle() {
            if chars >= target {
                break;
            }
            let len = sentence.chars().count();
            if chars + len <= target {
                text.push_str(sentence);
                chars += len;
            } else {
                text.extend(sentence.chars().take(target - chars));
                chars = target;
            }
        }
        text
    }

    /// A context probe prompt of roughly `target_tokens` tokens: a one-line
    /// instruction followed by filler.
    pub fn generate_prompt(&self, target_tokens: u32) -> String {
        self.with_instruction(CONTEXT_INSTRUCTION, target_tokens)
    }

    /// The fixed prompt for output probes, asking for as much text as the
    /// endpoint will produce.
    pub fn generate_output_prompt(&self, target_tokens: u32) -> String {
        self.with_instruction(OUTPUT_INSTRUCTION, target_tokens)
    }

    fn with_instruction(&self, instruction: &str, target_tokens: u32) -> String {
        let overhead = self.estimate_tokens(instruction) + 2;
        let filler = self.generate(target_tokens.saturating_sub(overhead));
        format!("{instruction}\n\n{filler}")
    }

    /// A prompt of roughly `target_tokens` tokens with `needle` embedded at
    /// `position` and a question about it at the end.
    pub fn generate_with_needle(
        &self,
        target_tokens: u32,
        position: NeedlePosition,
        needle: &str,
    ) -> NeedleDocument {
        let preamble = NEEDLE_PREAMBLE.to_string();
        let question = format!("Question: {NEEDLE_QUESTION}\nAnswer:");
        let overhead = self.estimate_tokens(&preamble)
            + self.estimate_tokens(needle)
            + self.estimate_tokens(&question)
            + 4;
        let filler = self.generate(target_tokens.saturating_sub(overhead));

        let filler_chars: Vec<char> = filler.chars().collect();
        let offset = split_point(&filler_chars, position);
        let mut body: String = filler_chars[..offset].iter().collect();
        body.push('\n');
        body.push_str(needle);
        body.push('\n');
        body.extend(filler_chars[offset..].iter());
        let needle_offset = offset + 1;

        let text = format!("{preamble}\n\n{body}\n\n{question}");
        NeedleDocument {
            text,
            preamble,
            body,
            needle: needle.to_string(),
            question,
            needle_offset,
        }
    }
}

/// Character index at which to splice the needle: the relative position,
/// moved forward to just after the next sentence end when one is close.
fn split_point(chars: &[char], position: NeedlePosition) -> usize {
    let len = chars.len();
    let raw = ((len as f64) * position.fraction()).round() as usize;
    if raw >= len {
        return len;
    }
    let window_end = (raw + BOUNDARY_SEARCH_WINDOW).min(len);
    chars[raw..window_end]
        .iter()
        .position(|c| matches!(c, '。' | '.' | '！' | '？'))
        .map_or(raw, |i| raw + i + 1)
}
