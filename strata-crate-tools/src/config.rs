use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// option 的初始值文件
///
/// ```toml
/// [options]
/// frame_overlap = 3
/// present_mode = "mailbox"
/// debug_mode = true
/// ```
///
/// 键为 option 名，值可以是字符串、整数、浮点或布尔，统一转换为字符串后交给 option 自己解析。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionSeed {
    #[serde(default)]
    pub options: BTreeMap<String, toml::Value>,
}

impl OptionSeed {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("读取 option 文件失败: {:?}", path.as_ref()))?;
        Self::parse(&content).with_context(|| format!("解析 option 文件失败: {:?}", path.as_ref()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let seed: OptionSeed = toml::from_str(content)?;
        for (name, value) in &seed.options {
            value_to_string(value).with_context(|| format!("option `{name}` 的值类型不受支持"))?;
        }
        Ok(seed)
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// 按名字顺序输出 (name, value) 字符串对
    pub fn entries(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        self.options
            .iter()
            .filter_map(|(name, value)| value_to_string(value).map(|v| (name.as_str(), v)))
    }

    /// 逐项写入，遇到第一个错误即返回
    pub fn apply<E, F>(&self, mut set: F) -> anyhow::Result<usize>
    where
        F: FnMut(&str, &str) -> Result<(), E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut count = 0;
        for (name, value) in self.entries() {
            set(name, &value).with_context(|| format!("应用 option `{name}` = `{value}` 失败"))?;
            log::info!("option seed: {} = {}", name, value);
            count += 1;
        }
        Ok(count)
    }
}

fn value_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mixed_value_types() {
        let seed = OptionSeed::parse(
            r#"
            [options]
            frame_overlap = 3
            present_mode = "mailbox"
            debug_mode = true
            "#,
        )
        .unwrap();

        let entries: Vec<_> = seed.entries().map(|(n, v)| (n.to_string(), v)).collect();
        assert_eq!(
            entries,
            vec![
                ("debug_mode".to_string(), "true".to_string()),
                ("frame_overlap".to_string(), "3".to_string()),
                ("present_mode".to_string(), "mailbox".to_string()),
            ]
        );
    }

    #[test]
    fn missing_table_is_empty() {
        let seed = OptionSeed::parse("").unwrap();
        assert!(seed.is_empty());
    }

    #[test]
    fn nested_table_is_rejected() {
        let err = OptionSeed::parse("[options.window]\nwidth = 3\n").unwrap_err();
        assert!(format!("{err:#}").contains("window"));
    }

    #[test]
    fn apply_stops_at_first_error() {
        let seed = OptionSeed::parse("[options]\na = 1\nb = 2\nc = 3\n").unwrap();
        let mut seen = Vec::new();
        let result = seed.apply(|name, value| {
            seen.push(format!("{name}={value}"));
            if name == "b" {
                Err(std::io::Error::other("bad value"))
            } else {
                Ok(())
            }
        });

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("bad value"));
        assert_eq!(seen, vec!["a=1", "b=2"]);
    }

    #[test]
    fn apply_counts_entries() {
        let seed = OptionSeed::parse("[options]\nmax_fps = 60\n").unwrap();
        let count = seed.apply(|_, _| Ok::<(), std::io::Error>(())).unwrap();
        assert_eq!(count, 1);
    }
}
