//! sFlow v5 datagram unwrapping (§4.4.1): extracts the raw sampled Ethernet
//! frame from `FLOW_SAMPLE`/`EXPANDED_FLOW_SAMPLE` records so it can be
//! re-synthesized as an ordinary [`PacketEvent`]. Full counter-sample
//! decoding (interface counters) is out of scope — only flow samples feed
//! the packet pipeline.

const SFLOW_VERSION: u32 = 5;
const FLOW_SAMPLE: u32 = 1;
const EXPANDED_FLOW_SAMPLE: u32 = 3;
const RAW_PACKET_HEADER: u32 = 1;

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn read_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let bytes = [
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ];
        self.pos += 4;
        Some(u32::from_be_bytes(bytes))
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        if self.remaining() < n {
            return None;
        }
        self.pos += n;
        Some(())
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }
}

/// Returns the sampled raw Ethernet frames carried in every
/// `FLOW_SAMPLE`/`EXPANDED_FLOW_SAMPLE` record of an sFlow v5 datagram, or
/// an empty vec if `datagram` isn't a recognizable sFlow v5 payload.
pub fn extract_sampled_frames(datagram: &[u8]) -> Vec<Vec<u8>> {
    let mut cursor = Cursor::new(datagram);
    let mut frames = Vec::new();

    let Some(version) = cursor.read_u32() else {
        return frames;
    };
    if version != SFLOW_VERSION {
        return frames;
    }

    let Some(agent_family) = cursor.read_u32() else {
        return frames;
    };
    let agent_addr_len = if agent_family == 2 { 16 } else { 4 };
    if cursor.skip(agent_addr_len).is_none() {
        return frames;
    }
    // sub_agent_id, sequence_number, uptime
    if cursor.skip(12).is_none() {
        return frames;
    }
    let Some(num_samples) = cursor.read_u32() else {
        return frames;
    };

    for _ in 0..num_samples {
        let Some(sample_type) = cursor.read_u32() else {
            break;
        };
        let Some(sample_len) = cursor.read_u32() else {
            break;
        };
        let Some(sample_data) = cursor.take(sample_len as usize) else {
            break;
        };

        if sample_type == FLOW_SAMPLE || sample_type == EXPANDED_FLOW_SAMPLE {
            frames.extend(extract_from_flow_sample(sample_type, sample_data));
        }
        // counter samples (type 2/4) are intentionally not decoded.
    }

    frames
}

fn extract_from_flow_sample(sample_type: u32, sample_data: &[u8]) -> Vec<Vec<u8>> {
    let mut cursor = Cursor::new(sample_data);
    let mut frames = Vec::new();

    let header_fields = if sample_type == FLOW_SAMPLE { 6 } else { 8 };
    if cursor.skip(header_fields * 4).is_none() {
        return frames;
    }

    let Some(num_records) = cursor.read_u32() else {
        return frames;
    };

    for _ in 0..num_records {
        let Some(data_format) = cursor.read_u32() else {
            break;
        };
        let Some(flow_data_len) = cursor.read_u32() else {
            break;
        };
        let Some(flow_data) = cursor.take(flow_data_len as usize) else {
            break;
        };

        if data_format == RAW_PACKET_HEADER {
            if let Some(frame) = extract_raw_packet_header(flow_data) {
                frames.push(frame);
            }
        }
        // records are padded to a 4-byte boundary.
        let padding = (4 - (flow_data_len as usize % 4)) % 4;
        if cursor.skip(padding).is_none() {
            break;
        }
    }

    frames
}

fn extract_raw_packet_header(data: &[u8]) -> Option<Vec<u8>> {
    let mut cursor = Cursor::new(data);
    let _header_protocol = cursor.read_u32()?;
    let _frame_length = cursor.read_u32()?;
    let _stripped = cursor.read_u32()?;
    let header_length = cursor.read_u32()? as usize;
    cursor.take(header_length).map(|s| s.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_datagram(samples: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(5u32.to_be_bytes()); // version
        out.extend(1u32.to_be_bytes()); // agent address family (IPv4)
        out.extend([0u8; 4]); // agent address
        out.extend([0u8; 4]); // sub agent id
        out.extend([0u8; 4]); // sequence number
        out.extend([0u8; 4]); // uptime
        out.extend((samples.len() as u32).to_be_bytes());
        for sample in samples {
            out.extend_from_slice(sample);
        }
        out
    }

    fn build_flow_sample_with_raw_header(eth_frame: &[u8]) -> Vec<u8> {
        let mut record_data = Vec::new();
        record_data.extend(1u32.to_be_bytes()); // header_protocol = ethernet
        record_data.extend((eth_frame.len() as u32).to_be_bytes()); // frame_length
        record_data.extend(0u32.to_be_bytes()); // stripped
        record_data.extend((eth_frame.len() as u32).to_be_bytes()); // header_length
        record_data.extend_from_slice(eth_frame);
        while record_data.len() % 4 != 0 {
            record_data.push(0);
        }

        let mut sample_data = Vec::new();
        sample_data.extend([0u8; 6 * 4]); // sequence_number..output_if
        sample_data.extend(1u32.to_be_bytes()); // num_flow_records
        sample_data.extend(RAW_PACKET_HEADER.to_be_bytes());
        sample_data.extend((record_data.len() as u32).to_be_bytes());
        sample_data.extend_from_slice(&record_data);

        let mut sample = Vec::new();
        sample.extend(FLOW_SAMPLE.to_be_bytes());
        sample.extend((sample_data.len() as u32).to_be_bytes());
        sample.extend_from_slice(&sample_data);
        sample
    }

    #[test]
    fn extracts_the_sampled_ethernet_frame() {
        let eth_frame = vec![0xde, 0xad, 0xbe, 0xef];
        let sample = build_flow_sample_with_raw_header(&eth_frame);
        let datagram = build_datagram(&[sample]);

        let frames = extract_sampled_frames(&datagram);
        assert_eq!(frames, vec![eth_frame]);
    }

    #[test]
    fn non_sflow_datagram_yields_nothing() {
        let garbage = vec![1, 2, 3, 4, 5, 6, 7, 8];
        assert!(extract_sampled_frames(&garbage).is_empty());
    }

    #[test]
    fn wrong_version_yields_nothing() {
        let mut datagram = build_datagram(&[]);
        datagram[3] = 4; // version = 4, not 5
        assert!(extract_sampled_frames(&datagram).is_empty());
    }
}
