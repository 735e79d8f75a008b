//! Lossless baseline to progressive JPEG transcoding.
//!
//! The entropy-coded scans are decoded down to quantized DCT coefficients
//! and written back as a progressive (SOF2) stream: one DC scan, then
//! spectral-selection AC scans, each with its own optimal Huffman table.
//! Quantization tables and APPn/COM segments are carried over byte for
//! byte, so every decoder produces the same pixels as before.

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DQT: u8 = 0xDB;
const DRI: u8 = 0xDD;
const DHT: u8 = 0xC4;
const SOF0: u8 = 0xC0;
const SOF1: u8 = 0xC1;
const SOF2: u8 = 0xC2;
const COM: u8 = 0xFE;

/// Largest frame this pass will hold in memory as coefficients.
const MAX_PIXELS: usize = 64 * 1024 * 1024;
/// Longest EOB run a single EOBn symbol can carry.
const MAX_EOB_RUN: u32 = 0x7FFF;

/// Transcode a baseline JPEG to progressive.
///
/// `Ok(None)` means the stream is left alone: it is already progressive,
/// or it uses a coding process this pass does not rewrite (arithmetic,
/// lossless, hierarchical, 12-bit).
pub fn to_progressive(bytes: &[u8]) -> Result<Option<Vec<u8>>, String> {
    let Some(image) = Decoder::new(bytes).decode()? else {
        return Ok(None);
    };
    encode(&image).map(Some)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

struct Component {
    id: u8,
    h: usize,
    v: usize,
    tq: u8,
    /// Blocks covering the component's own samples.
    blocks_wide: usize,
    blocks_high: usize,
    /// Row stride of `coefs`, padded to whole MCUs.
    stride: usize,
    /// Coefficients in zigzag order.
    coefs: Vec<[i16; 64]>,
    scanned: bool,
}

impl Component {
    fn block_index(&self, row: usize, col: usize) -> usize {
        row * self.stride + col
    }
}

struct Image {
    width: u16,
    height: u16,
    mcus_wide: usize,
    mcus_high: usize,
    components: Vec<Component>,
    /// APPn, COM and DQT segments, marker included, in file order.
    preamble: Vec<u8>,
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn decode(mut self) -> Result<Option<Image>, String> {
        if self.data.get(..2) != Some(&[0xFF, SOI][..]) {
            return Err("not a JPEG stream".to_string());
        }
        self.pos = 2;

        let mut preamble = Vec::new();
        let mut image: Option<Image> = None;
        let mut dc_tables: [Option<HuffDecoder>; 4] = Default::default();
        let mut ac_tables: [Option<HuffDecoder>; 4] = Default::default();
        let mut restart_interval = 0usize;

        while self.pos < self.data.len() {
            let marker = self.marker()?;
            match marker {
                EOI => break,
                SOF0 | SOF1 => {
                    let payload = self.segment()?;
                    match parse_frame(payload)? {
                        Some(frame) => image = Some(frame),
                        None => return Ok(None),
                    }
                }
                SOF2 => return Ok(None),
                // Remaining SOFn, DAC, DNL and anything unexpected.
                0xC3 | 0xC5..=0xCF | 0xDC => return Ok(None),
                DHT => parse_huffman(self.segment()?, &mut dc_tables, &mut ac_tables)?,
                DRI => {
                    let payload = self.segment()?;
                    let value = payload
                        .get(..2)
                        .ok_or("truncated restart interval")?;
                    restart_interval = usize::from(u16::from_be_bytes([value[0], value[1]]));
                }
                DQT | COM | 0xE0..=0xEF => {
                    let start = self.pos;
                    self.segment()?;
                    preamble.extend_from_slice(&[0xFF, marker]);
                    preamble.extend_from_slice(&self.data[start..self.pos]);
                }
                SOS => {
                    let Some(image) = image.as_mut() else {
                        return Err("scan before frame header".to_string());
                    };
                    let header = parse_scan(self.segment()?, image)?;
                    let (intervals, end) = entropy_intervals(self.data, self.pos);
                    self.pos = end;
                    decode_scan(image, &header, &intervals, restart_interval, &dc_tables, &ac_tables)?;
                }
                0xD0..=0xD7 => return Err("restart marker outside a scan".to_string()),
                _ => return Ok(None),
            }
        }

        let Some(mut image) = image else {
            return Err("no frame header".to_string());
        };
        if image.components.iter().any(|c| !c.scanned) {
            return Err("a component has no scan data".to_string());
        }
        image.preamble = preamble;
        Ok(Some(image))
    }

    fn marker(&mut self) -> Result<u8, String> {
        if self.data.get(self.pos) != Some(&0xFF) {
            return Err(format!("expected a marker at byte {}", self.pos));
        }
        while self.data.get(self.pos) == Some(&0xFF) {
            self.pos += 1;
        }
        let marker = *self.data.get(self.pos).ok_or("truncated marker")?;
        self.pos += 1;
        Ok(marker)
    }

    /// Payload of the length-prefixed segment at the cursor.
    fn segment(&mut self) -> Result<&'a [u8], String> {
        let len = self
            .data
            .get(self.pos..self.pos + 2)
            .map(|b| usize::from(u16::from_be_bytes([b[0], b[1]])))
            .ok_or("truncated segment length")?;
        if len < 2 {
            return Err("segment length below 2".to_string());
        }
        let payload = self
            .data
            .get(self.pos + 2..self.pos + len)
            .ok_or("truncated segment")?;
        self.pos += len;
        Ok(payload)
    }
}

fn parse_frame(payload: &[u8]) -> Result<Option<Image>, String> {
    let header = payload.get(..6).ok_or("truncated frame header")?;
    if header[0] != 8 {
        return Ok(None);
    }
    let height = u16::from_be_bytes([header[1], header[2]]);
    let width = u16::from_be_bytes([header[3], header[4]]);
    let count = usize::from(header[5]);
    if height == 0 {
        // Height deferred to a DNL segment.
        return Ok(None);
    }
    if width == 0 || count == 0 || count > 4 {
        return Err("invalid frame dimensions".to_string());
    }
    if usize::from(width) * usize::from(height) > MAX_PIXELS {
        return Ok(None);
    }
    let fields = payload
        .get(6..6 + 3 * count)
        .ok_or("truncated component list")?;

    let mut sampling = Vec::with_capacity(count);
    for field in fields.chunks_exact(3) {
        let (h, v) = (usize::from(field[1] >> 4), usize::from(field[1] & 0x0F));
        if !(1..=4).contains(&h) || !(1..=4).contains(&v) || field[2] > 3 {
            return Err("invalid component sampling".to_string());
        }
        sampling.push((field[0], h, v, field[2]));
    }

    let h_max = sampling.iter().map(|s| s.1).max().unwrap_or(1);
    let v_max = sampling.iter().map(|s| s.2).max().unwrap_or(1);
    let (width_px, height_px) = (usize::from(width), usize::from(height));
    let mcus_wide = width_px.div_ceil(8 * h_max);
    let mcus_high = height_px.div_ceil(8 * v_max);

    let components = sampling
        .into_iter()
        .map(|(id, h, v, tq)| {
            let stride = mcus_wide * h;
            let rows = mcus_high * v;
            Component {
                id,
                h,
                v,
                tq,
                blocks_wide: (width_px * h).div_ceil(h_max).div_ceil(8),
                blocks_high: (height_px * v).div_ceil(v_max).div_ceil(8),
                stride,
                coefs: vec![[0; 64]; stride * rows],
                scanned: false,
            }
        })
        .collect();

    Ok(Some(Image {
        width,
        height,
        mcus_wide,
        mcus_high,
        components,
        preamble: Vec::new(),
    }))
}

fn parse_huffman(
    mut payload: &[u8],
    dc: &mut [Option<HuffDecoder>; 4],
    ac: &mut [Option<HuffDecoder>; 4],
) -> Result<(), String> {
    while let Some((&class_id, rest)) = payload.split_first() {
        let counts: [u8; 16] = rest
            .get(..16)
            .and_then(|c| c.try_into().ok())
            .ok_or("truncated Huffman table")?;
        let total: usize = counts.iter().map(|&c| usize::from(c)).sum();
        let values = rest.get(16..16 + total).ok_or("truncated Huffman values")?;
        let table = HuffDecoder::new(&counts, values)?;
        let slot = usize::from(class_id & 0x0F);
        if slot > 3 {
            return Err("Huffman table id out of range".to_string());
        }
        match class_id >> 4 {
            0 => dc[slot] = Some(table),
            1 => ac[slot] = Some(table),
            _ => return Err("invalid Huffman table class".to_string()),
        }
        payload = &rest[16 + total..];
    }
    Ok(())
}

struct ScanHeader {
    /// (component index, DC table, AC table)
    components: Vec<(usize, usize, usize)>,
}

fn parse_scan(payload: &[u8], image: &Image) -> Result<ScanHeader, String> {
    let count = usize::from(*payload.first().ok_or("truncated scan header")?);
    if count == 0 || count > 4 {
        return Err("invalid scan component count".to_string());
    }
    let fields = payload
        .get(1..1 + 2 * count)
        .ok_or("truncated scan header")?;
    let tail = payload
        .get(1 + 2 * count..4 + 2 * count)
        .ok_or("truncated scan header")?;
    if tail != [0, 63, 0] {
        return Err("baseline scan with a partial spectrum".to_string());
    }

    let mut components = Vec::with_capacity(count);
    for field in fields.chunks_exact(2) {
        let index = image
            .components
            .iter()
            .position(|c| c.id == field[0])
            .ok_or("scan names an unknown component")?;
        let (dc, ac) = (usize::from(field[1] >> 4), usize::from(field[1] & 0x0F));
        if dc > 3 || ac > 3 {
            return Err("Huffman table id out of range".to_string());
        }
        components.push((index, dc, ac));
    }
    Ok(ScanHeader { components })
}

/// Split the entropy-coded data starting at `start` on restart markers.
/// Returns the intervals and the offset of the marker that ends the scan.
fn entropy_intervals(data: &[u8], start: usize) -> (Vec<&[u8]>, usize) {
    let mut intervals = Vec::new();
    let mut begin = start;
    let mut i = start;
    while i + 1 < data.len() {
        if data[i] == 0xFF {
            match data[i + 1] {
                0x00 => {
                    i += 2;
                    continue;
                }
                0xD0..=0xD7 => {
                    intervals.push(&data[begin..i]);
                    i += 2;
                    begin = i;
                    continue;
                }
                _ => break,
            }
        }
        i += 1;
    }
    if i + 1 >= data.len() {
        i = data.len();
    }
    intervals.push(&data[begin..i]);
    (intervals, i)
}

fn decode_scan(
    image: &mut Image,
    header: &ScanHeader,
    intervals: &[&[u8]],
    restart_interval: usize,
    dc_tables: &[Option<HuffDecoder>; 4],
    ac_tables: &[Option<HuffDecoder>; 4],
) -> Result<(), String> {
    let mut tables = Vec::with_capacity(header.components.len());
    for &(_, dc, ac) in &header.components {
        let dc = dc_tables[dc].as_ref().ok_or("scan uses an undefined DC table")?;
        let ac = ac_tables[ac].as_ref().ok_or("scan uses an undefined AC table")?;
        tables.push((dc, ac));
    }

    let single = header.components.len() == 1;
    let total = if single {
        let c = &image.components[header.components[0].0];
        c.blocks_wide * c.blocks_high
    } else {
        image.mcus_wide * image.mcus_high
    };
    let per_interval = if restart_interval > 0 { restart_interval } else { total };

    let mut mcu = 0;
    for interval in intervals {
        if mcu >= total {
            break;
        }
        let mut reader = BitReader::new(interval);
        let mut predictions = [0i32; 4];
        let end = (mcu + per_interval).min(total);
        while mcu < end {
            if single {
                let (index, _, _) = header.components[0];
                let (dc, ac) = tables[0];
                let component = &mut image.components[index];
                let (row, col) = (mcu / component.blocks_wide, mcu % component.blocks_wide);
                let block = component.block_index(row, col);
                decode_block(&mut reader, dc, ac, &mut predictions[0], &mut component.coefs[block])?;
            } else {
                let (mcu_row, mcu_col) = (mcu / image.mcus_wide, mcu % image.mcus_wide);
                for (slot, &(index, _, _)) in header.components.iter().enumerate() {
                    let (dc, ac) = tables[slot];
                    let component = &mut image.components[index];
                    for v in 0..component.v {
                        for h in 0..component.h {
                            let block = component
                                .block_index(mcu_row * component.v + v, mcu_col * component.h + h);
                            decode_block(
                                &mut reader,
                                dc,
                                ac,
                                &mut predictions[slot],
                                &mut component.coefs[block],
                            )?;
                        }
                    }
                }
            }
            mcu += 1;
        }
        if reader.overrun {
            return Err("scan data is truncated".to_string());
        }
    }
    if mcu < total {
        return Err("scan data ended early".to_string());
    }
    for &(index, _, _) in &header.components {
        image.components[index].scanned = true;
    }
    Ok(())
}

fn decode_block(
    reader: &mut BitReader<'_>,
    dc: &HuffDecoder,
    ac: &HuffDecoder,
    prediction: &mut i32,
    block: &mut [i16; 64],
) -> Result<(), String> {
    let size = u32::from(dc.decode(reader)?);
    if size > 11 {
        return Err("DC difference out of range".to_string());
    }
    *prediction += reader.receive_extend(size);
    block[0] = i16::try_from(*prediction).map_err(|_| "DC coefficient out of range")?;

    let mut k = 1;
    while k < 64 {
        let symbol = ac.decode(reader)?;
        let (run, size) = (usize::from(symbol >> 4), u32::from(symbol & 0x0F));
        if size == 0 {
            if run == 15 {
                k += 16;
                continue;
            }
            break;
        }
        k += run;
        if k > 63 || size > 10 {
            return Err("AC coefficient out of range".to_string());
        }
        // |value| < 2^10, so the narrowing is exact.
        block[k] = reader.receive_extend(size) as i16;
        k += 1;
    }
    Ok(())
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    bits: u32,
    /// Set once a read ran past the interval; valid scans never do.
    overrun: bool,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            bits: 0,
            overrun: false,
        }
    }

    fn next_byte(&mut self) -> u32 {
        let Some(&byte) = self.data.get(self.pos) else {
            self.overrun = true;
            return 0;
        };
        self.pos += 1;
        if byte == 0xFF && self.data.get(self.pos) == Some(&0x00) {
            self.pos += 1;
        }
        u32::from(byte)
    }

    fn bit(&mut self) -> u32 {
        if self.bits == 0 {
            self.acc = self.next_byte();
            self.bits = 8;
        }
        self.bits -= 1;
        (self.acc >> self.bits) & 1
    }

    fn receive(&mut self, count: u32) -> i32 {
        let mut value = 0i32;
        for _ in 0..count {
            value = (value << 1) | self.bit() as i32;
        }
        value
    }

    fn receive_extend(&mut self, size: u32) -> i32 {
        if size == 0 {
            return 0;
        }
        let value = self.receive(size);
        if value < 1 << (size - 1) {
            value - (1 << size) + 1
        } else {
            value
        }
    }
}

#[derive(Default)]
struct HuffDecoder {
    max_code: [i32; 17],
    min_code: [i32; 17],
    offset: [usize; 17],
    values: Vec<u8>,
}

impl HuffDecoder {
    fn new(counts: &[u8; 16], values: &[u8]) -> Result<Self, String> {
        let mut table = Self {
            values: values.to_vec(),
            ..Self::default()
        };
        let mut code = 0i32;
        let mut k = 0usize;
        for len in 1..=16 {
            let n = usize::from(counts[len - 1]);
            if n == 0 {
                table.max_code[len] = -1;
            } else {
                table.offset[len] = k;
                table.min_code[len] = code;
                code += n as i32;
                k += n;
                table.max_code[len] = code - 1;
            }
            if code > 1 << len {
                return Err("over-subscribed Huffman table".to_string());
            }
            code <<= 1;
        }
        Ok(table)
    }

    fn decode(&self, reader: &mut BitReader<'_>) -> Result<u8, String> {
        let mut code = 0i32;
        for len in 1..=16 {
            code = (code << 1) | reader.bit() as i32;
            if code <= self.max_code[len] {
                let index = self.offset[len] + (code - self.min_code[len]) as usize;
                return self
                    .values
                    .get(index)
                    .copied()
                    .ok_or_else(|| "Huffman code outside its table".to_string());
            }
        }
        Err("invalid Huffman code".to_string())
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// One progressive scan: DC when `start == 0`, otherwise an AC band of a
/// single component.
struct ScanPlan {
    components: Vec<usize>,
    start: u8,
    end: u8,
}

/// DC first, then the low luma band, chroma, and the rest of luma.
fn scan_plan(image: &Image) -> Vec<ScanPlan> {
    let count = image.components.len();
    let blocks_per_mcu: usize = image.components.iter().map(|c| c.h * c.v).sum();

    let mut plan = Vec::new();
    if count > 1 && blocks_per_mcu <= 10 {
        plan.push(ScanPlan {
            components: (0..count).collect(),
            start: 0,
            end: 0,
        });
    } else {
        plan.extend((0..count).map(|c| ScanPlan {
            components: vec![c],
            start: 0,
            end: 0,
        }));
    }
    plan.push(ScanPlan {
        components: vec![0],
        start: 1,
        end: 5,
    });
    plan.extend((1..count).map(|c| ScanPlan {
        components: vec![c],
        start: 1,
        end: 63,
    }));
    plan.push(ScanPlan {
        components: vec![0],
        start: 6,
        end: 63,
    });
    plan
}

fn encode(image: &Image) -> Result<Vec<u8>, String> {
    let mut out = vec![0xFF, SOI];
    out.extend_from_slice(&image.preamble);

    let count = image.components.len();
    out.extend_from_slice(&[0xFF, SOF2]);
    out.extend_from_slice(&((8 + 3 * count) as u16).to_be_bytes());
    out.push(8);
    out.extend_from_slice(&image.height.to_be_bytes());
    out.extend_from_slice(&image.width.to_be_bytes());
    out.push(count as u8);
    for c in &image.components {
        out.extend_from_slice(&[c.id, ((c.h as u8) << 4) | c.v as u8, c.tq]);
    }

    for scan in scan_plan(image) {
        write_scan(&mut out, image, &scan)?;
    }
    out.extend_from_slice(&[0xFF, EOI]);
    Ok(out)
}

fn write_scan(out: &mut Vec<u8>, image: &Image, scan: &ScanPlan) -> Result<(), String> {
    let mut counter = SymbolCounter::default();
    run_scan(image, scan, &mut counter)?;
    let table = HuffTable::optimal(&counter.frequencies);

    let class = if scan.start == 0 { 0x00 } else { 0x10 };
    out.extend_from_slice(&[0xFF, DHT]);
    out.extend_from_slice(&((2 + 1 + 16 + table.values.len()) as u16).to_be_bytes());
    out.push(class);
    out.extend_from_slice(&table.counts);
    out.extend_from_slice(&table.values);

    out.extend_from_slice(&[0xFF, SOS]);
    out.extend_from_slice(&((6 + 2 * scan.components.len()) as u16).to_be_bytes());
    out.push(scan.components.len() as u8);
    for &index in &scan.components {
        out.extend_from_slice(&[image.components[index].id, 0x00]);
    }
    out.extend_from_slice(&[scan.start, scan.end, 0x00]);

    let mut emitter = SymbolEmitter {
        table: &table,
        writer: BitWriter::default(),
    };
    run_scan(image, scan, &mut emitter)?;
    out.extend_from_slice(&emitter.writer.finish());
    Ok(())
}

trait SymbolSink {
    fn symbol(&mut self, symbol: u8) -> Result<(), String>;
    fn bits(&mut self, value: u32, count: u32);
}

#[derive(Default)]
struct SymbolCounter {
    frequencies: Vec<u32>,
}

impl SymbolSink for SymbolCounter {
    fn symbol(&mut self, symbol: u8) -> Result<(), String> {
        if self.frequencies.is_empty() {
            self.frequencies = vec![0; 256];
        }
        self.frequencies[usize::from(symbol)] += 1;
        Ok(())
    }

    fn bits(&mut self, _value: u32, _count: u32) {}
}

struct SymbolEmitter<'t> {
    table: &'t HuffTable,
    writer: BitWriter,
}

impl SymbolSink for SymbolEmitter<'_> {
    fn symbol(&mut self, symbol: u8) -> Result<(), String> {
        let (code, len) = self.table.codes[usize::from(symbol)];
        if len == 0 {
            return Err("symbol missing from its Huffman table".to_string());
        }
        self.writer.put(u32::from(code), u32::from(len));
        Ok(())
    }

    fn bits(&mut self, value: u32, count: u32) {
        self.writer.put(value, count);
    }
}

fn run_scan(image: &Image, scan: &ScanPlan, sink: &mut impl SymbolSink) -> Result<(), String> {
    if scan.start == 0 {
        encode_dc(image, &scan.components, sink)
    } else {
        let component = &image.components[scan.components[0]];
        encode_ac(component, usize::from(scan.start), usize::from(scan.end), sink)
    }
}

fn magnitude_bits(value: i32) -> u32 {
    32 - value.unsigned_abs().leading_zeros()
}

fn value_bits(value: i32, size: u32) -> u32 {
    let raw = if value < 0 { value - 1 } else { value };
    (raw as u32) & ((1 << size) - 1)
}

fn encode_dc_value(sink: &mut impl SymbolSink, difference: i32) -> Result<(), String> {
    let size = magnitude_bits(difference);
    if size > 11 {
        return Err("DC difference out of range".to_string());
    }
    sink.symbol(size as u8)?;
    if size > 0 {
        sink.bits(value_bits(difference, size), size);
    }
    Ok(())
}

fn encode_dc(image: &Image, components: &[usize], sink: &mut impl SymbolSink) -> Result<(), String> {
    let mut predictions = [0i32; 4];
    if let [index] = components {
        let c = &image.components[*index];
        for row in 0..c.blocks_high {
            for col in 0..c.blocks_wide {
                let value = i32::from(c.coefs[c.block_index(row, col)][0]);
                encode_dc_value(sink, value - predictions[0])?;
                predictions[0] = value;
            }
        }
        return Ok(());
    }

    for mcu_row in 0..image.mcus_high {
        for mcu_col in 0..image.mcus_wide {
            for (slot, &index) in components.iter().enumerate() {
                let c = &image.components[index];
                for v in 0..c.v {
                    for h in 0..c.h {
                        let block = c.block_index(mcu_row * c.v + v, mcu_col * c.h + h);
                        let value = i32::from(c.coefs[block][0]);
                        encode_dc_value(sink, value - predictions[slot])?;
                        predictions[slot] = value;
                    }
                }
            }
        }
    }
    Ok(())
}

fn flush_eob_run(sink: &mut impl SymbolSink, run: &mut u32) -> Result<(), String> {
    if *run == 0 {
        return Ok(());
    }
    let size = 31 - run.leading_zeros();
    sink.symbol((size as u8) << 4)?;
    if size > 0 {
        sink.bits(*run & ((1 << size) - 1), size);
    }
    *run = 0;
    Ok(())
}

fn encode_ac(
    c: &Component,
    start: usize,
    end: usize,
    sink: &mut impl SymbolSink,
) -> Result<(), String> {
    let mut eob_run = 0u32;
    for row in 0..c.blocks_high {
        for col in 0..c.blocks_wide {
            let block = &c.coefs[c.block_index(row, col)];
            let mut zeros = 0u32;
            for &coef in &block[start..=end] {
                if coef == 0 {
                    zeros += 1;
                    continue;
                }
                flush_eob_run(sink, &mut eob_run)?;
                while zeros > 15 {
                    sink.symbol(0xF0)?;
                    zeros -= 16;
                }
                let value = i32::from(coef);
                let size = magnitude_bits(value);
                if size > 10 {
                    return Err("AC coefficient out of range".to_string());
                }
                sink.symbol(((zeros as u8) << 4) | size as u8)?;
                sink.bits(value_bits(value, size), size);
                zeros = 0;
            }
            if zeros > 0 {
                eob_run += 1;
                if eob_run == MAX_EOB_RUN {
                    flush_eob_run(sink, &mut eob_run)?;
                }
            }
        }
    }
    flush_eob_run(sink, &mut eob_run)
}

#[derive(Default)]
struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    bits: u32,
}

impl BitWriter {
    fn put(&mut self, value: u32, count: u32) {
        if count == 0 {
            return;
        }
        self.acc = (self.acc << count) | (value & ((1 << count) - 1));
        self.bits += count;
        while self.bits >= 8 {
            let byte = (self.acc >> (self.bits - 8)) as u8;
            self.out.push(byte);
            if byte == 0xFF {
                self.out.push(0x00);
            }
            self.bits -= 8;
        }
        self.acc &= (1 << self.bits) - 1;
    }

    /// Pad the last byte with one bits.
    fn finish(mut self) -> Vec<u8> {
        if self.bits > 0 {
            let pad = 8 - self.bits;
            self.put((1 << pad) - 1, pad);
        }
        self.out
    }
}

/// A Huffman table limited to 16-bit codes, built from symbol counts.
struct HuffTable {
    counts: [u8; 16],
    values: Vec<u8>,
    /// (code, length) per symbol; length 0 for unused symbols.
    codes: Vec<(u16, u8)>,
}

impl HuffTable {
    fn optimal(frequencies: &[u32]) -> Self {
        // Slot 256 is a reserved symbol that keeps any real code from
        // being all ones.
        let mut freq = [0u64; 257];
        for (slot, &f) in freq.iter_mut().zip(frequencies) {
            *slot = u64::from(f);
        }
        if freq[..256].iter().all(|&f| f == 0) {
            freq[0] = 1;
        }
        freq[256] = 1;

        let mut code_size = [0usize; 257];
        let mut others = [None::<usize>; 257];
        loop {
            let Some(c1) = smallest(&freq, None) else {
                break;
            };
            let Some(c2) = smallest(&freq, Some(c1)) else {
                break;
            };
            freq[c1] += freq[c2];
            freq[c2] = 0;

            let mut node = c1;
            code_size[node] += 1;
            while let Some(next) = others[node] {
                node = next;
                code_size[node] += 1;
            }
            others[node] = Some(c2);

            let mut node = c2;
            code_size[node] += 1;
            while let Some(next) = others[node] {
                node = next;
                code_size[node] += 1;
            }
        }

        let mut bits = [0usize; 65];
        for &size in &code_size {
            if size > 0 {
                bits[size.min(64)] += 1;
            }
        }
        for i in (17..=64).rev() {
            while bits[i] > 0 {
                let mut j = i - 2;
                while j > 0 && bits[j] == 0 {
                    j -= 1;
                }
                bits[i] -= 2;
                bits[i - 1] += 1;
                bits[j + 1] += 2;
                bits[j] -= 1;
            }
        }
        let mut longest = 16;
        while longest > 0 && bits[longest] == 0 {
            longest -= 1;
        }
        if longest > 0 {
            bits[longest] -= 1;
        }

        let mut values = Vec::new();
        for size in 1..=64 {
            for symbol in 0..256 {
                if code_size[symbol] == size {
                    values.push(symbol as u8);
                }
            }
        }

        let mut counts = [0u8; 16];
        for (len, count) in counts.iter_mut().enumerate() {
            *count = bits[len + 1] as u8;
        }

        let mut codes = vec![(0u16, 0u8); 256];
        let mut code = 0u32;
        let mut k = 0;
        for len in 1..=16u8 {
            for _ in 0..counts[usize::from(len) - 1] {
                if let Some(&symbol) = values.get(k) {
                    codes[usize::from(symbol)] = (code as u16, len);
                }
                code += 1;
                k += 1;
            }
            code <<= 1;
        }

        Self {
            counts,
            values,
            codes,
        }
    }
}

/// Index of the smallest non-zero frequency, preferring the highest index
/// on ties.
fn smallest(freq: &[u64; 257], skip: Option<usize>) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &f) in freq.iter().enumerate() {
        if f == 0 || Some(i) == skip {
            continue;
        }
        if best.is_none_or(|b| f <= freq[b]) {
            best = Some(i);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{DynamicImage, GrayImage, Luma};

    fn gray_jpeg() -> Vec<u8> {
        let img = GrayImage::from_fn(37, 21, |x, y| Luma([((x * 7 + y * 11) % 256) as u8]));
        let mut out = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, 85))
            .unwrap();
        out
    }

    #[test]
    fn coefficients_survive_the_round_trip() {
        let original = Decoder::new(&gray_jpeg()).decode().unwrap().unwrap();
        let progressive = to_progressive(&gray_jpeg()).unwrap().unwrap();
        assert!(Decoder::new(&progressive).decode().unwrap().is_none());

        // Re-reading our own output needs a progressive decoder; compare
        // through the image crate instead.
        let a = image::load_from_memory(&gray_jpeg()).unwrap().to_luma8();
        let b = image::load_from_memory(&progressive).unwrap().to_luma8();
        assert_eq!(a.dimensions(), (37, 21));
        assert_eq!(a, b);
        assert_eq!(original.components.len(), 1);
    }

    #[test]
    fn optimal_table_limits_code_length() {
        let mut freq = vec![0u32; 256];
        // Fibonacci counts force a maximally skewed tree.
        let (mut a, mut b) = (1u32, 1u32);
        for slot in freq.iter_mut().take(30) {
            *slot = a;
            (a, b) = (b, a.saturating_add(b));
        }
        let table = HuffTable::optimal(&freq);
        assert_eq!(table.values.len(), 30);
        assert!(table.codes.iter().all(|&(_, len)| len <= 16));
        let total: usize = table.counts.iter().map(|&c| usize::from(c)).sum();
        assert_eq!(total, 30);
    }

    #[test]
    fn single_symbol_tables_are_valid() {
        let mut freq = vec![0u32; 256];
        freq[0] = 5;
        let table = HuffTable::optimal(&freq);
        assert_eq!(table.values, vec![0]);
        assert_eq!(table.codes[0], (0, 1));
    }

    #[test]
    fn eob_runs_use_the_run_length_symbol() {
        let mut counter = SymbolCounter::default();
        let mut run = 5;
        flush_eob_run(&mut counter, &mut run).unwrap();
        assert_eq!(run, 0);
        assert_eq!(counter.frequencies[0x20], 1);
    }

    #[test]
    fn truncated_streams_are_errors() {
        let jpeg = gray_jpeg();
        assert!(to_progressive(&jpeg[..jpeg.len() / 2]).is_err());
        assert!(to_progressive(b"\xFF\xD8\xFF").is_err());
        assert!(to_progressive(b"GIF89a").is_err());
    }
}
