// 该文件是 Kanjian （看见） 项目的一部分。
// src/router.rs - 提示词路由
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! 将自由文本指令拆分为检测查询与分割查询。

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
  Detect,
  Segment,
}

/// 路由结果，两个列表各自去重并保持首次出现的顺序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutedPrompt {
  pub detect: Vec<String>,
  pub segment: Vec<String>,
}

impl RoutedPrompt {
  /// 两个列表都为空表示没有请求任何操作
  pub fn is_empty(&self) -> bool {
    self.detect.is_empty() && self.segment.is_empty()
  }

  pub fn push(&mut self, capability: Capability, query: String) {
    let list = match capability {
      Capability::Detect => &mut self.detect,
      Capability::Segment => &mut self.segment,
    };
    if !list.contains(&query) {
      list.push(query);
    }
  }

  /// 检测与分割查询的并集，去重
  pub fn all_queries(&self) -> Vec<String> {
    let mut all: Vec<String> = Vec::with_capacity(self.detect.len() + self.segment.len());
    for query in self.detect.iter().chain(self.segment.iter()) {
      if !all.contains(query) {
        all.push(query.clone());
      }
    }
    all
  }
}

pub trait PromptRouter: Send + Sync {
  fn route(&self, prompt: &str) -> RoutedPrompt;
}

/// 基于短语表的规则路由：短语后紧跟的单词作为目标，生成 "a X" 查询，
/// 目标以元音字母开头时为 "an X"
pub struct RuleRouter {
  rules: Vec<(String, Capability)>,
}

impl Default for RuleRouter {
  fn default() -> Self {
    Self::new()
      .rule("box around the", Capability::Detect)
      .rule("detect the", Capability::Detect)
      .rule("segment the", Capability::Segment)
  }
}

impl RuleRouter {
  /// 空规则表
  pub fn new() -> Self {
    Self { rules: Vec::new() }
  }

  pub fn rule(mut self, phrase: &str, capability: Capability) -> Self {
    self.rules.push((phrase.to_lowercase(), capability));
    self
  }
}

impl PromptRouter for RuleRouter {
  fn route(&self, prompt: &str) -> RoutedPrompt {
    let words: Vec<String> = prompt
      .split_whitespace()
      .map(|w| {
        w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
          .to_lowercase()
      })
      .filter(|w| !w.is_empty())
      .collect();

    // 所有规则的匹配按在提示词中的位置排序后输出
    let mut hits: Vec<(usize, Capability, String)> = Vec::new();
    for (phrase, capability) in &self.rules {
      let phrase: Vec<&str> = phrase.split_whitespace().collect();
      if phrase.is_empty() || words.len() <= phrase.len() {
        continue;
      }
      for start in 0..words.len() - phrase.len() {
        let matched = phrase
          .iter()
          .zip(&words[start..])
          .all(|(p, w)| *p == w.as_str());
        if matched {
          let target = &words[start + phrase.len()];
          hits.push((start, *capability, with_article(target)));
        }
      }
    }
    hits.sort_by_key(|(start, _, _)| *start);

    let mut routed = RoutedPrompt::default();
    for (_, capability, query) in hits {
      routed.push(capability, query);
    }
    debug!(
      "提示词路由: {:?} -> 检测 {:?}, 分割 {:?}",
      prompt, routed.detect, routed.segment
    );
    routed
  }
}

/// 冠词只看首字母，"unicorn" 也会得到 "an"
fn with_article(noun: &str) -> String {
  let article = match noun.chars().next() {
    Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
    _ => "a",
  };
  format!("{} {}", article, noun)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn route(prompt: &str) -> RoutedPrompt {
    RuleRouter::default().route(prompt)
  }

  #[test]
  fn built_in_phrasings() {
    assert_eq!(
      route("box around the cat"),
      RoutedPrompt {
        detect: vec!["a cat".into()],
        segment: vec![],
      }
    );
    assert_eq!(
      route("segment the dog"),
      RoutedPrompt {
        detect: vec![],
        segment: vec!["a dog".into()],
      }
    );
    assert_eq!(
      route("box around the cat and segment the dog"),
      RoutedPrompt {
        detect: vec!["a cat".into()],
        segment: vec!["a dog".into()],
      }
    );
    assert_eq!(route("detect the cat").detect, vec!["a cat".to_string()]);
  }

  #[test]
  fn unmatched_prompt_is_empty() {
    assert!(route("hello").is_empty());
    assert!(route("").is_empty());
    assert!(route("segment the").is_empty());
  }

  #[test]
  fn duplicates_are_removed() {
    let routed = route("Detect the cat, then draw a box around the cat!");
    assert_eq!(routed.detect, vec!["a cat".to_string()]);
    assert!(routed.segment.is_empty());
  }

  #[test]
  fn same_target_in_both_lists_is_kept_once_in_union() {
    let routed = route("detect the apple and segment the apple");
    assert_eq!(routed.detect, vec!["an apple".to_string()]);
    assert_eq!(routed.segment, vec!["an apple".to_string()]);
    assert_eq!(routed.all_queries(), vec!["an apple".to_string()]);
  }

  #[test]
  fn article_follows_first_letter() {
    assert_eq!(route("detect the owl").detect, vec!["an owl".to_string()]);
    assert_eq!(route("detect the unicorn").detect, vec!["an unicorn".to_string()]);
    assert_eq!(route("detect the jar").detect, vec!["a jar".to_string()]);
  }

  #[test]
  fn routing_is_deterministic() {
    let prompt = "segment the dog and detect the bird and box around the cat";
    let first = route(prompt);
    assert_eq!(first, route(prompt));
    assert_eq!(first.detect, vec!["a bird".to_string(), "a cat".to_string()]);
  }

  #[test]
  fn custom_rules() {
    let router = RuleRouter::new().rule("find the", Capability::Detect);
    assert_eq!(router.route("find the car").detect, vec!["a car".to_string()]);
    assert!(router.route("detect the car").is_empty());
  }
}
