use lute_flt::{
    AdapterError, Direction, FontAdapter, Glyph, MemoryTableSource, Registry,
};

/// Identity font for the demo: glyph ids are the codes themselves.
struct DemoFont;

impl FontAdapter for DemoFont {
    fn x_ppem(&self) -> i32 {
        16
    }

    fn y_ppem(&self) -> i32 {
        16
    }

    fn glyph_ids(&mut self, glyphs: &mut [Glyph]) -> Result<(), AdapterError> {
        for g in glyphs.iter_mut() {
            if !g.encoded && !g.is_separator() {
                g.encoded = true;
            }
        }
        Ok(())
    }

    fn metrics(&mut self, glyphs: &mut [Glyph]) -> Result<(), AdapterError> {
        for g in glyphs.iter_mut() {
            if !g.measured {
                g.xadv = 10 << 6;
                g.ascent = 12 << 6;
                g.descent = 4 << 6;
                g.rbearing = g.xadv;
                g.measured = true;
            }
        }
        Ok(())
    }
}

fn main() {
    // A miniature nukta-handling table: cluster a consonant with a
    // following nukta sign and attach the sign below the base.
    let mut source = MemoryTableSource::new();
    source.insert(
        "demo-deva",
        r#"
        (category (0x0900 0x097F ?E) (0x093C ?N))
        (generator ("(EN?)*" syllable *)
                   (syllable ("EN?" < base nukta >))
                   (base ("E" =))
                   (nukta ("N" bc.tc =)))
        "#,
    );
    let mut registry = Registry::new(Box::new(source));
    let table = registry.get("demo-deva").expect("table compiles");

    // KA + NUKTA, then a plain KHA.
    let chars = [0x0915, 0x093C, 0x0916];
    let mut glyphs: Vec<Glyph> = chars
        .iter()
        .map(|&c| Glyph {
            ch: c as i32,
            ..Glyph::default()
        })
        .collect();

    let mut font = DemoFont;
    let len = glyphs.len();
    let to = registry
        .run(
            &mut glyphs,
            0,
            len,
            &mut font,
            Some(table),
            Direction::LeftToRight,
        )
        .expect("shaping succeeds");

    println!("Shaped {} characters into {} glyphs:", chars.len(), to);
    for (i, g) in glyphs.iter().take(to).enumerate() {
        println!(
            "  #{i}: code=U+{:04X} span=[{},{}) xadv={} xoff={} yoff={}",
            g.code, g.from, g.to, g.xadv, g.xoff, g.yoff
        );
    }
}
