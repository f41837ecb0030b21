use bytes::Bytes;

use crate::event::{AdditionalData, EventData};
use crate::fields;
use crate::parser::{ParserState, ProtocolParser, RecordHeader, Verdict};
use crate::range;
use crate::sink::EventSink;

use super::{base_event, store, tag_code};

const V204_FIELDS: usize = 9;
const V210_FIELDS: usize = 6;
const MAX_CHANNELS: usize = 16;
const CAPTURE_TIME_LEN: usize = 4;

/// Camera clip notification.
#[derive(Debug, Default)]
pub struct V204 {
    state: ParserState,
}

impl V204 {
    pub fn boxed() -> Box<dyn ProtocolParser> {
        Box::<Self>::default()
    }
}

impl ProtocolParser for V204 {
    fn tag(&self) -> &'static str {
        "V204"
    }

    fn state(&self) -> &ParserState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ParserState {
        &mut self.state
    }

    fn validate(&mut self, buf: &[u8]) -> Verdict {
        match RecordHeader::read(buf, V204_FIELDS) {
            Some(header) if !header.field(8).trim().is_empty() => self.state.accept(&header),
            _ => self.state.reject(),
        }
    }

    fn parse(&mut self, buf: &[u8], sink: &dyn EventSink) -> Verdict {
        let Some(header) = RecordHeader::read(buf, V204_FIELDS) else {
            return self.state.reject();
        };
        let clip = header.field(8).trim();
        let mut event = base_event(&self.state, &header, self.tag());
        event.latitude = fields::double(header.field(4));
        event.longitude = fields::double(header.field(5));
        event.creation_code = range::small_int(fields::int(header.field(6)));
        event.additional = Some(AdditionalData {
            name: "ClipName".to_owned(),
            value: clip.to_owned(),
        });

        let data = [
            EventData::for_event(&event, "Channel").with_int(fields::int(header.field(7))),
            EventData::for_event(&event, "ClipName").with_text(clip),
        ];
        store(sink, &event, &data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

/// Geometry of a freeze-frame transfer, taken from its text header.
#[derive(Debug, Clone, Copy)]
struct FreezeFrame<'a> {
    samples: usize,
    channels: usize,
    order: ByteOrder,
    body: &'a [u8],
}

impl<'a> FreezeFrame<'a> {
    fn read(buf: &'a [u8], header: &RecordHeader<'_>) -> Option<Self> {
        let samples = usize::try_from(fields::int(header.field(4))).ok()?;
        let channels = usize::try_from(fields::int(header.field(5))).ok()?;
        if samples == 0 || channels == 0 || channels > MAX_CHANNELS {
            return None;
        }
        let order = match header.field(6).trim() {
            "BE" | "be" => ByteOrder::Big,
            _ => ByteOrder::Little,
        };
        let nul = buf.iter().position(|&b| b == 0)?;
        let body = &buf[nul + 1..];
        let needed = samples
            .checked_mul(channels)?
            .checked_mul(2)?
            .checked_add(CAPTURE_TIME_LEN)?;
        if body.len() < needed {
            return None;
        }
        Some(Self {
            samples,
            channels,
            order,
            body,
        })
    }

    fn capture_time(&self) -> u32 {
        let raw = fields::u32_le([self.body[0], self.body[1], self.body[2], self.body[3]]);
        match self.order {
            ByteOrder::Little => raw,
            ByteOrder::Big => fields::swap_u32(raw),
        }
    }

    fn sample(&self, index: usize, channel: usize) -> i16 {
        let at = CAPTURE_TIME_LEN + (index * self.channels + channel) * 2;
        let raw = fields::u16_le(self.body[at], self.body[at + 1]);
        let raw = match self.order {
            ByteOrder::Little => raw,
            ByteOrder::Big => fields::swap_u16(raw),
        };
        raw as i16
    }

    fn channel(&self, channel: usize) -> Vec<i16> {
        (0..self.samples).map(|i| self.sample(i, channel)).collect()
    }
}

/// Binary freeze-frame capture, delivered over many reads.
///
/// Text header `…,<samples>,<channels>[,BE|LE]` then NUL, a 32-bit capture
/// time and `samples * channels` interleaved 16-bit samples. The device
/// expects no ACK.
#[derive(Debug, Default)]
pub struct V210 {
    state: ParserState,
}

impl V210 {
    pub fn boxed() -> Box<dyn ProtocolParser> {
        Box::<Self>::default()
    }
}

impl ProtocolParser for V210 {
    fn tag(&self) -> &'static str {
        "V210"
    }

    fn state(&self) -> &ParserState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ParserState {
        &mut self.state
    }

    fn is_multi_chunk(&self) -> bool {
        true
    }

    fn validate(&mut self, buf: &[u8]) -> Verdict {
        match RecordHeader::read(buf, V210_FIELDS) {
            Some(header) if FreezeFrame::read(buf, &header).is_some() => {
                self.state.accept(&header)
            }
            _ => self.state.reject(),
        }
    }

    fn parse(&mut self, buf: &[u8], sink: &dyn EventSink) -> Verdict {
        let Some(header) = RecordHeader::read(buf, V210_FIELDS) else {
            return self.state.reject();
        };
        let Some(frame) = FreezeFrame::read(buf, &header) else {
            return self.state.reject();
        };

        let mut event = base_event(&self.state, &header, self.tag());
        event.creation_code = tag_code(self.tag());
        event.additional = Some(AdditionalData {
            name: "FreezeFrame".to_owned(),
            value: format!("{}x{}", frame.samples, frame.channels),
        });

        let mut data = Vec::with_capacity(frame.channels + 1);
        let mut capture = EventData::for_event(&event, "CaptureTime");
        capture.int_value = i32::try_from(frame.capture_time()).ok();
        data.push(capture);

        for channel in 0..frame.channels {
            let values = frame.channel(channel);
            let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64;
            let text = values
                .iter()
                .map(i16::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            let mut row = EventData::for_event(&event, format!("FreezeFrameCh{channel}"))
                .with_float(mean)
                .with_text(text);
            row.int_value = values.last().map(|&v| i32::from(v));
            data.push(row);
        }

        store(sink, &event, &data)
    }

    fn ack_or_nack(&self) -> Bytes {
        Bytes::new()
    }
}
