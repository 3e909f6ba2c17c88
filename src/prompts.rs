//! Prompt builders for the enrichment queries.
//!
//! Each prompt names the concert by title, artist, dates and venue, then spells out
//! the JSON shape expected back.

use crate::constants::{GENRES, MIN_SETLIST_SONGS};
use crate::domain::{Concert, SetlistKind};

fn concert_context(concert: &Concert) -> String {
    format!(
        "공연명: {}\n아티스트: {}\n기간: {} ~ {}\n공연장: {}",
        concert.title, concert.artist, concert.start_date, concert.end_date, concert.venue
    )
}

pub fn artist_name(title: &str) -> String {
    format!(
        "다음 내한 공연 제목에서 공연하는 아티스트(가수 또는 밴드) 이름만 알려주세요.\n\
         공연명: {title}\n\
         형식: {{\"artist\": \"아티스트 이름\"}}"
    )
}

pub fn ticket_info(concert: &Concert) -> String {
    format!(
        "{}\n\n이 공연의 티켓 예매처와 예매 링크를 찾아주세요.\n\
         형식: {{\"ticket_site\": \"예매처 이름\", \"ticket_url\": \"https://...\"}}",
        concert_context(concert)
    )
}

pub fn setlist(concert: &Concert, kind: SetlistKind) -> String {
    let ask = match kind {
        SetlistKind::Expected => format!(
            "이 공연에서 연주될 것으로 예상되는 셋리스트를 최근 투어 셋리스트를 참고해 최소 {MIN_SETLIST_SONGS}곡 이상 순서대로 알려주세요."
        ),
        SetlistKind::Past => format!(
            "이 공연에서 실제로 연주된 셋리스트를 최소 {MIN_SETLIST_SONGS}곡 이상 순서대로 알려주세요."
        ),
    };
    format!(
        "{}\n\n{ask}\n곡 제목은 원어 그대로 적어주세요.\n\
         형식: {{\"songs\": [{{\"title\": \"곡 제목\"}}]}}",
        concert_context(concert)
    )
}

pub fn culture(concert: &Concert) -> String {
    format!(
        "{}\n\n이 아티스트의 공연 문화(떼창, 응원법, 관객 이벤트, 드레스 코드 등)를 알려주세요.\n\
         형식: {{\"cultures\": [{{\"title\": \"제목\", \"content\": \"설명\"}}]}}",
        concert_context(concert)
    )
}

pub fn schedule(concert: &Concert) -> String {
    format!(
        "{}\n\n이 공연의 일정(티켓 오픈, 선예매, 공연 시작 등)을 알려주세요.\n\
         날짜와 시간은 반드시 YYYY-MM-DD HH:MM 형식으로 적어주세요.\n\
         형식: {{\"schedules\": [{{\"category\": \"일정 종류\", \"scheduled_at\": \"2025-01-01 20:00\"}}]}}",
        concert_context(concert)
    )
}

pub fn merchandise(concert: &Concert) -> String {
    format!(
        "{}\n\n이 공연 또는 투어의 공식 굿즈(MD) 목록을 알려주세요.\n\
         형식: {{\"merchandise\": [{{\"name\": \"상품명\", \"price\": \"가격\", \"img_url\": \"이미지 URL\"}}]}}",
        concert_context(concert)
    )
}

pub fn concert_info(concert: &Concert) -> String {
    format!(
        "{}\n\n관객이 알아야 할 공연 정보(관람 연령, 러닝타임, 입장 안내, 주의사항 등)를 알려주세요.\n\
         형식: {{\"infos\": [{{\"category\": \"항목\", \"content\": \"내용\"}}]}}",
        concert_context(concert)
    )
}

pub fn artist_bio(artist: &str) -> String {
    format!(
        "아티스트 '{artist}'에 대해 알려주세요.\n\
         형식: {{\"debut_date\": \"YYYY-MM-DD\", \"category\": \"솔로/밴드/그룹\", \
         \"detail\": \"2~3문장 소개\", \"instagram_url\": \"https://...\", \"keywords\": [\"키워드\"], \"img_url\": \"https://...\"}}"
    )
}

pub fn genres(concert: &Concert) -> String {
    format!(
        "{}\n\n이 아티스트의 음악 장르를 다음 목록에서만 골라주세요 (최대 3개): {}\n\
         형식: {{\"genres\": [\"POP\"]}}",
        concert_context(concert),
        GENRES.join(", ")
    )
}
