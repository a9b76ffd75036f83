use std::collections::HashMap;

use blockext_config::{DenylistVersion, LayerFilterConfig};
use blockext_core::document::{Document, LayerId};

/// 定义点图层，宿主 CAD 中永不打印的保留图层。
pub const DEFPOINTS_LAYER: &str = "Defpoints";

/// V1：中心线、孔、螺纹与铭牌等非几何注释图层。
const DENYLIST_V1: [&str; 6] = [
    "i_Осевые линии",
    "i_Отверстия",
    "i_Резьбы",
    "i_Шильд",
    "Осевая",
    "Осевая линия(ГОСТ)",
];

/// V2 在 V1 基础上追加的钻孔区域图层。
const DRILLING_ZONE_LAYER: &str = "i_Зоны сверления";

/// 不参与包围盒计算的图层名单。
///
/// 名单在构造时排序去重，查询使用二分查找；保留图层单独按名称精确比较。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDenylist {
    reserved: String,
    names: Vec<String>,
}

impl LayerDenylist {
    pub fn new<I, S>(reserved: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort_unstable();
        names.dedup();
        Self {
            reserved: reserved.into(),
            names,
        }
    }

    /// 指定版本的内置名单。
    pub fn preset(version: DenylistVersion) -> Self {
        let mut names: Vec<&str> = DENYLIST_V1.to_vec();
        if version == DenylistVersion::V2 {
            names.push(DRILLING_ZONE_LAYER);
        }
        Self::new(DEFPOINTS_LAYER, names)
    }

    pub fn from_config(config: &LayerFilterConfig) -> Self {
        let preset = Self::preset(config.denylist);
        Self::new(
            config.reserved.clone(),
            preset.names.into_iter().chain(config.extra_denied.iter().cloned()),
        )
    }

    pub fn is_denied(&self, name: &str) -> bool {
        name == self.reserved
            || self
                .names
                .binary_search_by(|candidate| candidate.as_str().cmp(name))
                .is_ok()
    }

    #[inline]
    pub fn reserved(&self) -> &str {
        &self.reserved
    }

    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for LayerDenylist {
    fn default() -> Self {
        Self::preset(DenylistVersion::default())
    }
}

#[derive(Debug, Clone)]
struct LayerState {
    name: String,
    is_frozen: bool,
    is_off: bool,
}

/// 图层可见性快照。构造后只读，可在并发计算之间共享。
#[derive(Debug, Clone)]
pub struct LayerVisibilityTable<'a> {
    layers: HashMap<LayerId, LayerState>,
    denylist: &'a LayerDenylist,
}

impl<'a> LayerVisibilityTable<'a> {
    pub fn snapshot(document: &Document, denylist: &'a LayerDenylist) -> Self {
        let layers = document
            .layers()
            .map(|(id, layer)| {
                (
                    id,
                    LayerState {
                        name: layer.name.clone(),
                        is_frozen: layer.is_frozen,
                        is_off: layer.is_off,
                    },
                )
            })
            .collect();
        Self { layers, denylist }
    }

    /// 冻结、关闭或名称被排除的图层不可见。快照中不存在的图层视为可见。
    pub fn is_visible(&self, layer: LayerId) -> bool {
        match self.layers.get(&layer) {
            Some(state) => {
                !state.is_frozen && !state.is_off && !self.denylist.is_denied(&state.name)
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_off_reserved_and_denied_layers_are_hidden() {
        let mut doc = Document::new();
        let geom = doc.ensure_layer("GEOM");
        let frozen = doc.ensure_layer("FROZEN");
        let off = doc.ensure_layer("OFF");
        let defpoints = doc.ensure_layer("Defpoints");
        let centerline = doc.ensure_layer("Осевая");
        let plate = doc.ensure_layer("i_Шильд");
        doc.layer_mut(frozen).unwrap().is_frozen = true;
        doc.layer_mut(off).unwrap().is_off = true;

        let denylist = LayerDenylist::default();
        let table = LayerVisibilityTable::snapshot(&doc, &denylist);
        assert!(table.is_visible(geom));
        assert!(!table.is_visible(frozen));
        assert!(!table.is_visible(off));
        assert!(!table.is_visible(defpoints));
        assert!(!table.is_visible(centerline));
        assert!(!table.is_visible(plate));
        assert!(table.is_visible(LayerId::new(999)));
    }

    #[test]
    fn matching_is_exact() {
        let denylist = LayerDenylist::default();
        assert!(denylist.is_denied("Осевая линия(ГОСТ)"));
        assert!(!denylist.is_denied("осевая"));
        assert!(!denylist.is_denied("Осевая "));
        assert!(!denylist.is_denied("defpoints"));
    }

    #[test]
    fn unsorted_input_is_sorted_before_lookup() {
        let denylist = LayerDenylist::new("Defpoints", ["zeta", "alpha", "mid", "alpha"]);
        assert_eq!(denylist.names(), ["alpha", "mid", "zeta"]);
        for name in ["zeta", "alpha", "mid"] {
            assert!(denylist.is_denied(name), "{name} should be denied");
        }
        assert!(!denylist.is_denied("beta"));
    }

    #[test]
    fn presets_are_versioned() {
        let v1 = LayerDenylist::preset(DenylistVersion::V1);
        let v2 = LayerDenylist::preset(DenylistVersion::V2);
        assert!(!v1.is_denied(DRILLING_ZONE_LAYER));
        assert!(v2.is_denied(DRILLING_ZONE_LAYER));
        assert_eq!(v1.names().len() + 1, v2.names().len());
        for name in DENYLIST_V1 {
            assert!(v1.is_denied(name));
            assert!(v2.is_denied(name));
        }
    }

    #[test]
    fn config_extends_preset_and_overrides_reserved() {
        let config = LayerFilterConfig {
            denylist: DenylistVersion::V1,
            reserved: "DEFPTS".to_string(),
            extra_denied: vec!["NOTES".to_string(), "i_Резьбы".to_string()],
        };
        let denylist = LayerDenylist::from_config(&config);
        assert_eq!(denylist.reserved(), "DEFPTS");
        assert!(denylist.is_denied("DEFPTS"));
        assert!(!denylist.is_denied("Defpoints"));
        assert!(denylist.is_denied("NOTES"));
        assert_eq!(denylist.names().len(), DENYLIST_V1.len() + 1);
    }
}
