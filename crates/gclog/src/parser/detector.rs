use std::io::{self, Chain, Cursor, Read};

use tracing::debug;

use super::formats::*;
use super::traits::*;
use crate::conf::ParserConfig;

/// Literal substrings that identify one format.
pub struct Signature {
    needles: &'static [&'static str],
    format: GcFormat,
}

impl Signature {
    pub const fn new(needles: &'static [&'static str], format: GcFormat) -> Self {
        Self { needles, format }
    }
}

impl FormatDetector for Signature {
    fn detect(&self, sample: &str) -> Option<GcFormat> {
        self.needles
            .iter()
            .any(|needle| sample.contains(needle))
            .then_some(self.format)
    }
}

/// HP-UX records share the `<GC: ` opener; the two releases differ only in
/// the number of fields per record.
pub struct HpUxDetector;

impl FormatDetector for HpUxDetector {
    fn detect(&self, sample: &str) -> Option<GcFormat> {
        let start = sample.find("<GC: ")? + "<GC:".len();
        let record = &sample[start..];
        let body = record.find('>').map_or(record, |end| &record[..end]);
        let fields = body.split_whitespace().count();
        if fields == hpux::record_tokens(GcFormat::HpUx1_2) {
            Some(GcFormat::HpUx1_2)
        } else {
            Some(GcFormat::HpUx1_4_1)
        }
    }
}

/// Format sniffer over an ordered detector list. First match wins.
pub struct FormatSniffer {
    detectors: Vec<Box<dyn FormatDetector>>,
}

impl FormatSniffer {
    pub fn new() -> Self {
        let detectors: Vec<Box<dyn FormatDetector>> = vec![
            // Order matters! More specific signatures first
            Box::new(Signature::new(&["<verbosegc"], GcFormat::IbmJ9)),
            Box::new(Signature::new(&["since last AF or CON>"], GcFormat::Ibm1_4_2)),
            Box::new(Signature::new(&["<AF["], GcFormat::Ibm1_3_1)),
            Box::new(Signature::new(&["[YC#", "[OC#"], GcFormat::JRockit1_6)),
            Box::new(Signature::new(&["[memory ]"], GcFormat::JRockit1_5)),
            Box::new(Signature::new(&["milliseconds since last GC>", "<GC: freed"], GcFormat::Sun1_2_2)),
            Box::new(HpUxDetector),
            Box::new(Signature::new(&[" ms clock, ", "gc 1 @"], GcFormat::Go)),
            Box::new(Signature::new(&["][gc", "[gc,heap", "[gc,start"], GcFormat::Unified)),
            Box::new(Signature::new(
                &["Using Shenandoah", "Pause Init Mark", "Concurrent marking"],
                GcFormat::Shenandoah,
            )),
            Box::new(Signature::new(
                &["pause (young)", "G1Ergonomics", "[GC concurrent-", "garbage-first heap"],
                GcFormat::Sun1_6G1,
            )),
            Box::new(Signature::new(&["[Times:", "CMS-concurrent"], GcFormat::Sun1_6)),
            Box::new(Signature::new(&["[GC", "[Full GC"], GcFormat::Sun1_4)), // Fallback for plain HotSpot output
        ];

        Self { detectors }
    }

    pub fn detect(&self, sample: &str) -> Option<GcFormat> {
        self.detectors.iter().find_map(|d| d.detect(sample))
    }

    /// Read up to `limit` bytes, detect, and hand the consumed prefix back in
    /// front of the rest of the stream.
    pub fn sniff<R: Read>(&self, mut reader: R, limit: usize) -> io::Result<(Option<GcFormat>, Chain<Cursor<Vec<u8>>, R>)> {
        let mut prefix = Vec::with_capacity(limit);
        reader.by_ref().take(limit as u64).read_to_end(&mut prefix)?;

        let format = self.detect(&decode_ascii(&prefix));
        debug!(bytes = prefix.len(), format = ?format, "sniffed stream prefix");
        Ok((format, Cursor::new(prefix).chain(reader)))
    }
}

impl Default for FormatSniffer {
    fn default() -> Self {
        Self::new()
    }
}

/// ASCII view of raw log bytes. Anything outside ASCII becomes `?`.
pub fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { char::from(b) } else { '?' })
        .collect()
}

/// Fresh grammar instance for a sniffed format.
pub fn grammar_for(format: GcFormat, config: &ParserConfig) -> Box<dyn Grammar> {
    match format {
        GcFormat::Sun1_2_2 => Box::new(SunLegacyGrammar::new()),
        GcFormat::Sun1_4 | GcFormat::Sun1_6 => Box::new(SunGrammar::new(format)),
        GcFormat::Sun1_6G1 => Box::new(G1Grammar::new()),
        GcFormat::Unified => Box::new(UnifiedGrammar::new(config.max_pending_events)),
        GcFormat::Shenandoah => Box::new(ShenandoahGrammar::new()),
        GcFormat::Ibm1_3_1 | GcFormat::Ibm1_4_2 => Box::new(IbmGrammar::new(format)),
        GcFormat::IbmJ9 => Box::new(IbmJ9Grammar::new()),
        GcFormat::JRockit1_5 | GcFormat::JRockit1_6 => Box::new(JRockitGrammar::new(format)),
        GcFormat::HpUx1_2 | GcFormat::HpUx1_4_1 => Box::new(HpUxGrammar::new(format)),
        GcFormat::Go => Box::new(GoGrammar::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(sample: &str) -> Option<GcFormat> {
        FormatSniffer::new().detect(sample)
    }

    // ── signatures ──────────────────────────────────────────────

    #[test]
    fn test_ibm_j9() {
        let sample = "<?xml version=\"1.0\" ?>\n<verbosegc version=\"20090817_AA\">\n<af type=\"tenured\" id=\"1\">";
        assert_eq!(detect(sample), Some(GcFormat::IbmJ9));
    }

    #[test]
    fn test_ibm_1_4_2() {
        let sample = "<AF[5]: Allocation Failure. need 528 bytes, 5702 ms since last AF or CON>\n";
        assert_eq!(detect(sample), Some(GcFormat::Ibm1_4_2));
    }

    #[test]
    fn test_ibm_1_3_1() {
        let sample = "<AF[1]: Allocation Failure. need 32 bytes, 0 ms since last AF>\n";
        assert_eq!(detect(sample), Some(GcFormat::Ibm1_3_1));
    }

    #[test]
    fn test_jrockit_1_6() {
        let sample = "[INFO ][memory ] [YC#1] 0.579-0.609: YC 32768KB->18126KB (65536KB), 0.030 s\n";
        assert_eq!(detect(sample), Some(GcFormat::JRockit1_6));
    }

    #[test]
    fn test_jrockit_1_5() {
        let sample = "[memory ] 4.256-4.268: parallel nursery GC 57392K->8388K (131072K), 11.380 ms\n";
        assert_eq!(detect(sample), Some(GcFormat::JRockit1_5));
    }

    #[test]
    fn test_sun_1_2_2() {
        assert_eq!(detect("<GC: 101 milliseconds since last GC>\n"), Some(GcFormat::Sun1_2_2));
        assert_eq!(
            detect("<GC: freed 2849 objects, 159240 bytes in 3 ms, 79% free (1306144/1627136)>\n"),
            Some(GcFormat::Sun1_2_2)
        );
    }

    #[test]
    fn test_hpux_refined_by_field_count() {
        let twenty = "<GC: 1 2.188924 1 0 3014656 3538944 0 3538944 0 524288 524288 1179648 7339008 1179648 7339008 1048576 1048576 1048576 1048576 0.059488 >\n";
        assert_eq!(detect(twenty), Some(GcFormat::HpUx1_2));
        let twenty_two = "<GC: 2 5 12.5 7 0 31 2097152 2097152 0 2097152 65536 0 131072 4194304 8388608 1048576 8388608 1048576 1048576 1048576 1048576 0.25 >\n";
        assert_eq!(detect(twenty_two), Some(GcFormat::HpUx1_4_1));
    }

    #[test]
    fn test_go() {
        let sample = "gc 1 @0.012s 0%: 0.020+0.300+0.0047 ms clock, 0.040+0/0.250/0.100+0.0094 ms cpu, 4->4->5 MB, 8 MB goal, 8 P\n";
        assert_eq!(detect(sample), Some(GcFormat::Go));
    }

    #[test]
    fn test_unified() {
        let sample = "[0.010s][info][gc,heap] Heap region size: 1M\n[0.011s][info][gc] Using G1\n";
        assert_eq!(detect(sample), Some(GcFormat::Unified));
    }

    #[test]
    fn test_shenandoah() {
        let sample = "Using Shenandoah\n13.976: [Pause Init Mark, 3.587 ms]\n";
        assert_eq!(detect(sample), Some(GcFormat::Shenandoah));
    }

    #[test]
    fn test_g1() {
        let sample = "0.229: [GC pause (G1 Evacuation Pause) (young), 0.0123 secs]\n";
        assert_eq!(detect(sample), Some(GcFormat::Sun1_6G1));
    }

    #[test]
    fn test_sun_1_6() {
        let sample = "1.0: [GC 1.0: [DefNew: 960K->64K(960K), 0.0011 secs] 960K->100K(5056K), 0.0012 secs] [Times: user=0.00 sys=0.00, real=0.00 secs]\n";
        assert_eq!(detect(sample), Some(GcFormat::Sun1_6));
        assert_eq!(detect("2.0: [CMS-concurrent-mark-start]\n"), Some(GcFormat::Sun1_6));
    }

    #[test]
    fn test_sun_1_4() {
        assert_eq!(detect("0.100: [GC 1024K->512K(4096K), 0.0100 secs]\n"), Some(GcFormat::Sun1_4));
        assert_eq!(detect("[Full GC 1024K->512K(4096K), 0.0100 secs]\n"), Some(GcFormat::Sun1_4));
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(detect("hello world\nnothing to see here\n"), None);
        assert_eq!(detect(""), None);
    }

    // ── ordering ────────────────────────────────────────────────

    #[test]
    fn test_earlier_signature_wins() {
        let sample = "<verbosegc>\n[GC 1K->1K(2K), 0.1 secs]\n";
        assert_eq!(detect(sample), Some(GcFormat::IbmJ9));
        let sample = "0.1: [GC pause (young), 0.01 secs]\n [Times: user=0.00 sys=0.00, real=0.01 secs]\n";
        assert_eq!(detect(sample), Some(GcFormat::Sun1_6G1));
    }

    // ── sniffing ────────────────────────────────────────────────

    #[test]
    fn test_sniff_rechains_prefix() {
        let text = b"0.100: [GC 1024K->512K(4096K), 0.0100 secs]\n0.200: [GC 1024K->512K(4096K), 0.0100 secs]\n";
        let (format, mut stream) = FormatSniffer::new().sniff(&text[..], 16).unwrap();
        // 16 bytes are too few to see `[GC`
        assert_eq!(format, None);
        let mut all = Vec::new();
        stream.read_to_end(&mut all).unwrap();
        assert_eq!(all, text.to_vec());
    }

    #[test]
    fn test_sniff_limit_respected() {
        let mut text = vec![b'x'; 4096];
        text.extend_from_slice(b"\n[GC 1K->1K(2K), 0.1 secs]\n");
        let (format, _) = FormatSniffer::new().sniff(&text[..], 3072).unwrap();
        assert_eq!(format, None);
        let (format, _) = FormatSniffer::new().sniff(&text[..], 8192).unwrap();
        assert_eq!(format, Some(GcFormat::Sun1_4));
    }

    #[test]
    fn test_decode_ascii_replaces_non_ascii() {
        assert_eq!(decode_ascii(b"ab\xc3\xa9c"), "ab??c");
    }

    #[test]
    fn test_grammar_for_matches_format() {
        let config = ParserConfig::default();
        for format in [
            GcFormat::Sun1_2_2,
            GcFormat::Sun1_4,
            GcFormat::Sun1_6,
            GcFormat::Sun1_6G1,
            GcFormat::Unified,
            GcFormat::Shenandoah,
            GcFormat::Ibm1_3_1,
            GcFormat::Ibm1_4_2,
            GcFormat::IbmJ9,
            GcFormat::JRockit1_5,
            GcFormat::JRockit1_6,
            GcFormat::HpUx1_2,
            GcFormat::HpUx1_4_1,
            GcFormat::Go,
        ] {
            assert_eq!(grammar_for(format, &config).format(), format);
        }
    }
}
