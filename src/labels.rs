//! Class-name localization for the display.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::str::FromStr;

/// Returned when the class name has nothing to title-case.
pub const UNKNOWN_LABEL: &str = "?";

/// Which label table the display uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelLang {
    /// Japanese labels, for panels rendered with a CJK font.
    Ja,
    /// Short ASCII labels that fit HD44780 character ROMs.
    Ascii,
    /// Localization disabled; labels are the title-cased class name.
    En,
}

impl LabelLang {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelLang::Ja => "ja",
            LabelLang::Ascii => "ascii",
            LabelLang::En => "en",
        }
    }

    fn table(&self) -> Option<&'static [(&'static str, &'static str)]> {
        match self {
            LabelLang::Ja => Some(JA_LABELS),
            LabelLang::Ascii => Some(ASCII_LABELS),
            LabelLang::En => None,
        }
    }
}

impl FromStr for LabelLang {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ja" => Ok(LabelLang::Ja),
            "ascii" | "short" => Ok(LabelLang::Ascii),
            "en" | "off" => Ok(LabelLang::En),
            other => Err(anyhow!("unknown label language '{}' (expected ja, ascii or en)", other)),
        }
    }
}

/// Maps canonical class names to display labels. Immutable once built.
#[derive(Clone, Copy, Debug)]
pub struct Localizer {
    lang: LabelLang,
}

impl Localizer {
    pub fn new(lang: LabelLang) -> Self {
        Self { lang }
    }

    pub fn lang(&self) -> LabelLang {
        self.lang
    }

    /// Table value when present, otherwise the title-cased class name.
    ///
    /// Never returns an empty string.
    pub fn localize(&self, class_name: &str) -> String {
        if let Some(label) = self
            .lang
            .table()
            .and_then(|table| lookup(table, class_name))
        {
            return label.to_string();
        }
        let titled = title_case(class_name.trim());
        if titled.is_empty() {
            UNKNOWN_LABEL.to_string()
        } else {
            titled
        }
    }
}

fn lookup(table: &'static [(&'static str, &'static str)], class_name: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(name, _)| *name == class_name)
        .map(|(_, label)| *label)
}

/// Uppercases the first letter of every alphabetic run and lowercases the rest,
/// so "traffic light" becomes "Traffic Light" and "tv" becomes "Tv".
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_alpha = false;
    for ch in value.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

static JA_LABELS: &[(&str, &str)] = &[
    ("person", "人"),
    ("bicycle", "自転車"),
    ("car", "車"),
    ("motorcycle", "バイク"),
    ("airplane", "飛行機"),
    ("bus", "バス"),
    ("train", "電車"),
    ("truck", "トラック"),
    ("boat", "ボート"),
    ("traffic light", "信号"),
    ("fire hydrant", "消火栓"),
    ("stop sign", "停止標識"),
    ("parking meter", "駐車場"),
    ("bench", "ベンチ"),
    ("bird", "鳥"),
    ("cat", "猫"),
    ("dog", "犬"),
    ("horse", "馬"),
    ("sheep", "羊"),
    ("cow", "牛"),
    ("elephant", "象"),
    ("bear", "熊"),
    ("zebra", "シマウマ"),
    ("giraffe", "キリン"),
    ("backpack", "リュック"),
    ("umbrella", "傘"),
    ("handbag", "ハンドバッグ"),
    ("tie", "ネクタイ"),
    ("suitcase", "スーツケース"),
    ("frisbee", "フリスビー"),
    ("skis", "スキー"),
    ("snowboard", "スノボ"),
    ("sports ball", "ボール"),
    ("kite", "凧"),
    ("baseball bat", "バット"),
    ("baseball glove", "グローブ"),
    ("skateboard", "スケボ"),
    ("surfboard", "サーフボード"),
    ("tennis racket", "ラケット"),
    ("bottle", "ボトル"),
    ("wine glass", "ワイングラス"),
    ("cup", "カップ"),
    ("fork", "フォーク"),
    ("knife", "ナイフ"),
    ("spoon", "スプーン"),
    ("bowl", "ボウル"),
    ("banana", "バナナ"),
    ("apple", "りんご"),
    ("sandwich", "サンドイッチ"),
    ("orange", "オレンジ"),
    ("broccoli", "ブロッコリー"),
    ("carrot", "にんじん"),
    ("hot dog", "ホットドッグ"),
    ("pizza", "ピザ"),
    ("donut", "ドーナツ"),
    ("cake", "ケーキ"),
    ("chair", "椅子"),
    ("couch", "ソファ"),
    ("potted plant", "植物"),
    ("bed", "ベッド"),
    ("dining table", "テーブル"),
    ("toilet", "トイレ"),
    ("tv", "テレビ"),
    ("laptop", "ノートPC"),
    ("mouse", "マウス"),
    ("remote", "リモコン"),
    ("keyboard", "キーボード"),
    ("cell phone", "スマホ"),
    ("microwave", "電子レンジ"),
    ("oven", "オーブン"),
    ("toaster", "トースター"),
    ("sink", "シンク"),
    ("refrigerator", "冷蔵庫"),
    ("book", "本"),
    ("clock", "時計"),
    ("vase", "花瓶"),
    ("scissors", "ハサミ"),
    ("teddy bear", "テディベア"),
    ("hair drier", "ドライヤー"),
    ("toothbrush", "歯ブラシ"),
];

static ASCII_LABELS: &[(&str, &str)] = &[
    ("person", "Person"),
    ("bicycle", "Bicycle"),
    ("car", "Car"),
    ("motorcycle", "Bike"),
    ("airplane", "Plane"),
    ("bus", "Bus"),
    ("train", "Train"),
    ("truck", "Truck"),
    ("boat", "Boat"),
    ("traffic light", "Light"),
    ("fire hydrant", "Hydrant"),
    ("stop sign", "Stop"),
    ("parking meter", "Meter"),
    ("bench", "Bench"),
    ("bird", "Bird"),
    ("cat", "Cat"),
    ("dog", "Dog"),
    ("horse", "Horse"),
    ("sheep", "Sheep"),
    ("cow", "Cow"),
    ("elephant", "Elephant"),
    ("bear", "Bear"),
    ("zebra", "Zebra"),
    ("giraffe", "Giraffe"),
    ("backpack", "Backpack"),
    ("umbrella", "Umbrella"),
    ("handbag", "Handbag"),
    ("tie", "Tie"),
    ("suitcase", "Suitcase"),
    ("frisbee", "Frisbee"),
    ("skis", "Skis"),
    ("snowboard", "Snowboard"),
    ("sports ball", "Ball"),
    ("kite", "Kite"),
    ("baseball bat", "Bat"),
    ("baseball glove", "Glove"),
    ("skateboard", "Skateboard"),
    ("surfboard", "Surfboard"),
    ("tennis racket", "Racket"),
    ("bottle", "Bottle"),
    ("wine glass", "Glass"),
    ("cup", "Cup"),
    ("fork", "Fork"),
    ("knife", "Knife"),
    ("spoon", "Spoon"),
    ("bowl", "Bowl"),
    ("banana", "Banana"),
    ("apple", "Apple"),
    ("sandwich", "Sandwich"),
    ("orange", "Orange"),
    ("broccoli", "Broccoli"),
    ("carrot", "Carrot"),
    ("hot dog", "Hot Dog"),
    ("pizza", "Pizza"),
    ("donut", "Donut"),
    ("cake", "Cake"),
    ("chair", "Chair"),
    ("couch", "Couch"),
    ("potted plant", "Plant"),
    ("bed", "Bed"),
    ("dining table", "Table"),
    ("toilet", "Toilet"),
    ("tv", "TV"),
    ("laptop", "Laptop"),
    ("mouse", "Mouse"),
    ("remote", "Remote"),
    ("keyboard", "Keyboard"),
    ("cell phone", "Phone"),
    ("microwave", "Microwave"),
    ("oven", "Oven"),
    ("toaster", "Toaster"),
    ("sink", "Sink"),
    ("refrigerator", "Fridge"),
    ("book", "Book"),
    ("clock", "Clock"),
    ("vase", "Vase"),
    ("scissors", "Scissors"),
    ("teddy bear", "Teddy"),
    ("hair drier", "Dryer"),
    ("toothbrush", "Toothbrush"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_use_the_table() {
        assert_eq!(Localizer::new(LabelLang::Ja).localize("person"), "人");
        assert_eq!(Localizer::new(LabelLang::Ja).localize("cell phone"), "スマホ");
        assert_eq!(Localizer::new(LabelLang::Ascii).localize("refrigerator"), "Fridge");
        assert_eq!(Localizer::new(LabelLang::Ascii).localize("tv"), "TV");
    }

    #[test]
    fn unknown_names_are_title_cased() {
        let localizer = Localizer::new(LabelLang::Ja);
        assert_eq!(localizer.localize("forklift"), "Forklift");
        assert_eq!(localizer.localize("road cone"), "Road Cone");
        assert_eq!(localizer.localize("HARD-HAT"), "Hard-Hat");
    }

    #[test]
    fn disabled_localization_title_cases_everything() {
        let localizer = Localizer::new(LabelLang::En);
        assert_eq!(localizer.localize("person"), "Person");
        assert_eq!(localizer.localize("traffic light"), "Traffic Light");
        assert_eq!(localizer.localize("tv"), "Tv");
    }

    #[test]
    fn localize_never_returns_empty() {
        for lang in [LabelLang::Ja, LabelLang::Ascii, LabelLang::En] {
            let localizer = Localizer::new(lang);
            assert_eq!(localizer.localize(""), UNKNOWN_LABEL);
            assert_eq!(localizer.localize("   "), UNKNOWN_LABEL);
            assert_eq!(localizer.localize("42"), "42");
        }
    }

    #[test]
    fn tables_cover_the_same_classes() {
        assert_eq!(JA_LABELS.len(), 80);
        assert_eq!(ASCII_LABELS.len(), 80);
        for ((ja, _), (ascii, _)) in JA_LABELS.iter().zip(ASCII_LABELS) {
            assert_eq!(ja, ascii);
        }
    }

    #[test]
    fn parses_language_flags() {
        assert_eq!("JA".parse::<LabelLang>().unwrap(), LabelLang::Ja);
        assert_eq!("short".parse::<LabelLang>().unwrap(), LabelLang::Ascii);
        assert_eq!("off".parse::<LabelLang>().unwrap(), LabelLang::En);
        assert!("fr".parse::<LabelLang>().is_err());
    }
}
