/// 模板解析
///
/// 按精确名称或正则在全量虚拟机清单中定位模板

use common::xapi::{OpaqueRef, VmRecord};
use common::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, info, warn};

use crate::session::Session;

/// 模板选择器
#[derive(Debug, Clone)]
pub enum TemplateSelector {
    ExactName(String),
    Pattern(Regex),
}

impl TemplateSelector {
    /// `/…/` 形式解析为正则，其余视为精确名称
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.len() >= 2 && trimmed.starts_with('/') && trimmed.ends_with('/') {
            let body = &trimmed[1..trimmed.len() - 1];
            let regex = Regex::new(body)
                .map_err(|e| Error::InvalidArgument(format!("模板正则无效 {}: {}", input, e)))?;
            return Ok(TemplateSelector::Pattern(regex));
        }
        Ok(TemplateSelector::ExactName(trimmed.to_string()))
    }

    /// 用于全量扫描的正则，精确名称按非锚定正则处理
    fn scan_regex(&self) -> Result<Regex> {
        match self {
            TemplateSelector::Pattern(regex) => Ok(regex.clone()),
            TemplateSelector::ExactName(name) => Regex::new(name)
                .or_else(|_| Regex::new(&regex::escape(name)))
                .map_err(|e| Error::InvalidArgument(format!("模板名无法作为正则: {}", e))),
        }
    }
}

impl fmt::Display for TemplateSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateSelector::ExactName(name) => f.write_str(name),
            TemplateSelector::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// 多个模板同时命中时的取舍
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    /// 清单顺序中最后一个命中者
    #[default]
    LastMatch,
    FirstMatch,
    /// 多于一个命中时报错
    RejectAmbiguous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatch {
    pub reference: OpaqueRef,
    pub name_label: String,
}

pub struct TemplateResolver {
    default: TemplateSelector,
    policy: MatchPolicy,
}

impl TemplateResolver {
    pub fn new(default: TemplateSelector) -> Self {
        Self {
            default,
            policy: MatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 查找模板，未指定选择器时使用默认选择器
    pub async fn find_template(
        &self,
        session: &Session,
        selector: Option<&TemplateSelector>,
    ) -> Result<Option<TemplateMatch>> {
        let selector = selector.unwrap_or(&self.default);

        if let TemplateSelector::ExactName(name) = selector {
            let refs = session.get_by_name_label("VM", name).await?;
            if let Some(reference) = refs.into_iter().next() {
                debug!("模板精确命中: {}", name);
                return Ok(Some(TemplateMatch {
                    reference,
                    name_label: name.clone(),
                }));
            }
        }

        let regex = selector.scan_regex()?;
        let records: Map<String, Value> = session.call("VM.get_all_records", vec![]).await?;

        let mut candidates = Vec::new();
        for (_, raw) in records {
            let record: VmRecord = serde_json::from_value(raw)?;
            if record.is_a_template && regex.is_match(&record.name_label) {
                candidates.push(record.name_label);
            }
        }

        let chosen = match (self.policy, candidates.len()) {
            (_, 0) => {
                info!("没有匹配 {} 的模板", selector);
                return Ok(None);
            }
            (MatchPolicy::RejectAmbiguous, n) if n > 1 => {
                return Err(Error::Ambiguous(format!(
                    "{} 匹配到 {} 个模板: {}",
                    selector,
                    n,
                    candidates.join(", ")
                )));
            }
            (MatchPolicy::FirstMatch, _) => candidates.swap_remove(0),
            _ => candidates.pop().unwrap_or_default(),
        };

        match session.get_by_name_label("VM", &chosen).await?.into_iter().next() {
            Some(reference) => {
                info!("✅ 使用模板: {}", chosen);
                Ok(Some(TemplateMatch {
                    reference,
                    name_label: chosen,
                }))
            }
            None => {
                warn!("模板 {} 在解析引用时已不存在", chosen);
                Ok(None)
            }
        }
    }
}
